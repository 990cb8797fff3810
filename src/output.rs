//! 출력 파일 관리
//!
//! - 모든 데이터는 `<dir>/<name>.part`에 기록되고, 완료 시에만 `<dir>/<name>`으로 rename
//! - 위치 지정 쓰기는 호출마다 자체 파일 핸들을 열어 공유 커서를 쓰지 않음
//! - 단위(범위/청크)끼리 바이트 구간이 겹치지 않으므로 쓰기 자체에는 락이 없음

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::catalog::validate_file_name;
use crate::Result;

/// 미완성 파일 확장자
pub const PART_SUFFIX: &str = ".part";

/// 다운로드 중인 출력 파일
#[derive(Debug, Clone)]
pub struct OutputFile {
    part_path: PathBuf,
    final_path: PathBuf,
}

impl OutputFile {
    /// 빈 `.part` 파일 생성 (디렉토리가 없으면 생성)
    pub async fn create(dir: &Path, name: &str) -> Result<Self> {
        validate_file_name(name)?;
        fs::create_dir_all(dir).await?;

        let output = Self {
            part_path: dir.join(format!("{name}{PART_SUFFIX}")),
            final_path: dir.join(name),
        };

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&output.part_path)
            .await?;

        Ok(output)
    }

    /// `total_size`로 미리 크기를 잡은 `.part` 파일 생성
    pub async fn preallocate(dir: &Path, name: &str, total_size: u64) -> Result<Self> {
        let output = Self::create(dir, name).await?;
        let file = OpenOptions::new().write(true).open(&output.part_path).await?;
        file.set_len(total_size).await?;
        debug!("출력 파일 준비: {:?} ({} bytes)", output.part_path, total_size);
        Ok(output)
    }

    /// `offset`에 데이터 기록 (호출마다 독립 핸들)
    pub async fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.part_path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// 버퍼들을 순서대로 이어 붙여 기록, 기록한 총 바이트 반환
    pub async fn write_sequential<B: AsRef<[u8]>>(&self, parts: &[B]) -> Result<u64> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.part_path)
            .await?;

        let mut written = 0u64;
        for part in parts {
            let part = part.as_ref();
            file.write_all(part).await?;
            written += part.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// 현재 디스크상의 `.part` 크기
    pub async fn len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.part_path).await?.len())
    }

    /// `.part` → 최종 이름으로 rename
    pub async fn commit(&self) -> Result<PathBuf> {
        fs::rename(&self.part_path, &self.final_path).await?;
        Ok(self.final_path.clone())
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disjoint_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::preallocate(dir.path(), "out.bin", 4000).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4u8 {
            let output = output.clone();
            handles.push(tokio::spawn(async move {
                output.write_at(i as u64 * 1000, &[i + 1; 1000]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let data = std::fs::read(output.part_path()).unwrap();
        assert_eq!(data.len(), 4000);
        for i in 0..4usize {
            assert!(data[i * 1000..(i + 1) * 1000].iter().all(|&b| b == i as u8 + 1));
        }
    }

    #[tokio::test]
    async fn test_commit_renames_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputFile::create(&dir.path().join("nested"), "a.txt").await.unwrap();
        let written = output
            .write_sequential(&[b"ab".to_vec(), Vec::new(), b"cde".to_vec()])
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert!(!output.final_path().exists());

        let path = output.commit().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
        assert!(!output.part_path().exists());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(OutputFile::create(dir.path(), "../x").await.is_err());
    }
}
