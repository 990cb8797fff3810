//! 카탈로그 서비스
//!
//! 서버가 제공하는 파일 이름 → 크기 매핑. 시작 시 매니페스트에서 한 번 만들어지고
//! 이후 변경되지 않으므로 `Arc<Catalog>`로 모든 연결 처리 태스크가 동기화 없이 공유한다.
//!
//! 매니페스트 형식 (줄 단위):
//! - 스트림: `name size` (size는 무시하고 디스크의 실제 크기 사용)
//! - 데이터그램: `name 10MB` / `name 512KB` (선언된 크기 사용)

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{info, warn};

use crate::{Error, Result};

/// 카탈로그 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub size: u64,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// 파일 카탈로그 (읽기 전용)
#[derive(Debug, Clone)]
pub struct Catalog {
    /// 파일이 위치한 디렉토리
    root: PathBuf,

    /// 매니페스트 순서를 유지한 항목
    entries: Vec<CatalogEntry>,

    /// 이름 → entries 인덱스
    index: HashMap<String, usize>,
}

impl Catalog {
    /// 항목 목록으로 카탈로그 생성
    ///
    /// 같은 이름이 반복되면 처음 위치에 마지막 크기가 남는다.
    pub fn new(root: impl Into<PathBuf>, entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self {
            root: root.into(),
            entries: Vec::new(),
            index: HashMap::new(),
        };
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    fn insert(&mut self, entry: CatalogEntry) {
        match self.index.get(&entry.name) {
            Some(&i) => self.entries[i].size = entry.size,
            None => {
                self.index.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// 스트림 바인딩 매니페스트 로드
    ///
    /// 각 이름을 `root` 기준 실제 파일로 확인하고 디스크 크기를 기록한다.
    pub fn load_stream_manifest(manifest: &Path, root: &Path) -> Result<Self> {
        Self::load_with(manifest, root, |line| {
            let name = parse_stream_line(line)?;
            let size = std::fs::metadata(root.join(&name))
                .map_err(|e| format!("{name}: {e}"))?
                .len();
            Ok(CatalogEntry::new(name, size))
        })
    }

    /// 데이터그램 바인딩 매니페스트 로드 (`KB`/`MB`/`GB` 접미사)
    pub fn load_datagram_manifest(manifest: &Path, root: &Path) -> Result<Self> {
        Self::load_with(manifest, root, parse_datagram_line)
    }

    fn load_with<F>(manifest: &Path, root: &Path, mut parse: F) -> Result<Self>
    where
        F: FnMut(&str) -> std::result::Result<CatalogEntry, String>,
    {
        let text = match std::fs::read_to_string(manifest) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("매니페스트 없음: {:?}, 빈 카탈로그로 시작", manifest);
                return Ok(Self::new(root, []));
            }
            Err(e) => return Err(e.into()),
        };

        let mut catalog = Self::new(root, []);
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse(line) {
                Ok(entry) => catalog.insert(entry),
                Err(reason) => {
                    let err = Error::ManifestParse { line: i + 1, reason };
                    warn!("{}, 건너뜀: {:?}", err, line);
                }
            }
        }

        info!("카탈로그 로드: {} 파일 ({:?})", catalog.len(), manifest);
        Ok(catalog)
    }

    /// 전체 목록 (비어 있으면 `NoFilesAvailable`)
    pub fn list(&self) -> Result<&[CatalogEntry]> {
        if self.entries.is_empty() {
            return Err(Error::NoFilesAvailable);
        }
        Ok(&self.entries)
    }

    /// 파일 크기 조회
    pub fn size_of(&self, name: &str) -> Result<u64> {
        self.index
            .get(name)
            .map(|&i| self.entries[i].size)
            .ok_or_else(|| Error::FileNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 카탈로그에 있는 파일의 디스크 경로
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        if !self.contains(name) {
            return Err(Error::FileNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// 파일을 열고 `offset`으로 이동
    pub async fn open_at(&self, name: &str, offset: u64) -> Result<File> {
        let mut file = File::open(self.path_of(name)?).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(file)
    }

    /// `offset`부터 최대 `max_len` 바이트 읽기 (파일 끝이면 짧거나 빈 결과)
    pub async fn read_at(&self, name: &str, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        let file = self.open_at(name, offset).await?;
        let mut buf = Vec::with_capacity(max_len);
        file.take(max_len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// 파일 이름 검증 (경로 구분자, `..` 금지)
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(Error::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// 크기 접미사 파싱: `10MB`, `512KB`, `2GB` (1024 단위)
pub fn parse_size_suffix(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("단위 없음: {s:?}"))?;
    let (value, unit) = s.split_at(split);

    let value: u64 = value.parse().map_err(|_| format!("숫자 아님: {s:?}"))?;
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return Err(format!("유효하지 않은 단위: {unit:?}")),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("크기 overflow: {s:?}"))
}

fn split_two(line: &str) -> std::result::Result<(&str, &str), String> {
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(name), Some(size), None) => {
            validate_file_name(name).map_err(|e| e.to_string())?;
            Ok((name, size))
        }
        _ => Err("`name size` 형식이 아님".into()),
    }
}

fn parse_stream_line(line: &str) -> std::result::Result<String, String> {
    split_two(line).map(|(name, _declared)| name.to_string())
}

fn parse_datagram_line(line: &str) -> std::result::Result<CatalogEntry, String> {
    let (name, size) = split_two(line)?;
    Ok(CatalogEntry::new(name, parse_size_suffix(size)?))
}
