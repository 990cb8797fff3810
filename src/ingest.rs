//! 요청 파일 목록 감시 루프
//!
//! 입력 파일(한 줄에 파일 이름 하나)을 주기적으로 읽고,
//! 아직 완료되지 않은 이름을 한 번에 하나씩 다운로드한다.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::stats::TransferReport;
use crate::Result;

/// 파일 하나를 가져오는 바인딩 (스트림 / 데이터그램)
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// 서버 파일 목록 (표시용 문자열)
    async fn list(&self) -> Result<String>;

    /// `output_dir` 아래로 파일 하나 다운로드
    async fn fetch(&self, name: &str, output_dir: &Path) -> Result<TransferReport>;
}

/// 요청 파일 읽기: 공백 제거, 빈 줄 무시, 중복 제거 (순서 유지)
pub async fn read_requested_names(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut seen = HashSet::new();
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect())
}

/// 요청 목록 감시 + 순차 다운로드
pub struct Ingestor<F> {
    fetcher: F,
    input_path: PathBuf,
    output_dir: PathBuf,
    poll_interval: Duration,

    /// 완료된 이름만 기억 (실패한 이름은 다음 폴링에서 재시도)
    completed: HashSet<String>,
}

impl<F: FileFetcher> Ingestor<F> {
    pub fn new(
        fetcher: F,
        input_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            poll_interval,
            completed: HashSet::new(),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    /// 입력 파일을 한 번 읽고 새 이름을 모두 처리
    pub async fn poll_once(&mut self) -> Vec<TransferReport> {
        let names = match read_requested_names(&self.input_path).await {
            Ok(names) => names,
            Err(e) => {
                warn!("{:?} 읽기 실패: {}", self.input_path, e);
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for name in names {
            if self.completed.contains(&name) {
                continue;
            }

            info!("Downloading {}", name);
            match self.fetcher.fetch(&name, &self.output_dir).await {
                Ok(report) => {
                    if report.complete {
                        self.completed.insert(name);
                    }
                    reports.push(report);
                }
                Err(e) => error!("Failed to download {}: {}", name, e),
            }
        }
        reports
    }

    /// Ctrl-C까지 `poll_interval`마다 폴링
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// `shutdown`이 끝날 때까지 폴링
    ///
    /// `shutdown`은 한 번만 만들어 대기와 다운로드 양쪽에 걸어 두므로
    /// 전송 도중 들어온 종료 신호도 놓치지 않는다.
    pub async fn run_until<S>(&mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                result = &mut shutdown => {
                    result?;
                    info!("Interrupted, stopping");
                    return Ok(());
                }
            }

            tokio::select! {
                reports = self.poll_once() => {
                    debug!("폴링 완료: {} transfers", reports.len());
                }
                result = &mut shutdown => {
                    result?;
                    info!("Interrupted during transfer, stopping");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Binding;
    use crate::Error;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 이름별로 정해진 결과를 돌려주는 가짜 바인딩
    #[derive(Default)]
    struct ScriptedFetcher {
        complete: HashMap<String, bool>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn with(entries: &[(&str, bool)]) -> Self {
            Self {
                complete: entries.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FileFetcher for ScriptedFetcher {
        async fn list(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn fetch(&self, name: &str, output_dir: &Path) -> Result<TransferReport> {
            self.calls.lock().push(name.to_string());
            let complete = *self
                .complete
                .get(name)
                .ok_or_else(|| Error::FileNotFound(name.to_string()))?;
            Ok(TransferReport {
                file_name: name.to_string(),
                binding: Binding::Stream,
                total_size: 1,
                units_total: 1,
                units_completed: complete as u64,
                failed_units: if complete { vec![] } else { vec![0] },
                bytes_written: complete as u64,
                complete,
                path: output_dir.join(name),
                elapsed_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_read_requested_names_trims_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        tokio::fs::write(&input, "a.bin\n\n  b.bin  \na.bin\n\t\n")
            .await
            .unwrap();

        let names = read_requested_names(&input).await.unwrap();
        assert_eq!(names, vec!["a.bin".to_string(), "b.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_completed_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        tokio::fs::write(&input, "done.bin\nflaky.bin\nmissing.bin\n")
            .await
            .unwrap();

        let fetcher = ScriptedFetcher::with(&[("done.bin", true), ("flaky.bin", false)]);
        let mut ingestor = Ingestor::new(fetcher, &input, dir.path(), Duration::from_millis(10));

        let first = ingestor.poll_once().await;
        assert_eq!(first.len(), 2);
        assert!(ingestor.is_completed("done.bin"));
        assert!(!ingestor.is_completed("flaky.bin"));

        // 완료된 이름은 다시 요청하지 않음
        ingestor.poll_once().await;
        let calls = ingestor.fetcher().calls.lock().clone();
        assert_eq!(
            calls,
            vec!["done.bin", "flaky.bin", "missing.bin", "flaky.bin", "missing.bin"]
        );
    }

    /// 다운로드가 끝나지 않는 바인딩
    #[derive(Default)]
    struct StalledFetcher {
        started: AtomicBool,
    }

    #[async_trait]
    impl FileFetcher for StalledFetcher {
        async fn list(&self) -> Result<String> {
            Ok(String::new())
        }

        async fn fetch(&self, _name: &str, _output_dir: &Path) -> Result<TransferReport> {
            self.started.store(true, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        tokio::fs::write(&input, "slow.bin\n").await.unwrap();

        let mut ingestor = Ingestor::new(
            StalledFetcher::default(),
            &input,
            dir.path(),
            Duration::from_millis(10),
        );
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<(), std::io::Error>(())
        };

        let finished =
            tokio::time::timeout(Duration::from_secs(5), ingestor.run_until(shutdown)).await;
        assert!(matches!(finished, Ok(Ok(()))));
        assert!(ingestor.fetcher().started.load(Ordering::SeqCst));
        assert!(!ingestor.is_completed("slow.bin"));
    }

    #[tokio::test]
    async fn test_missing_input_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut ingestor = Ingestor::new(
            ScriptedFetcher::default(),
            dir.path().join("absent.txt"),
            dir.path(),
            Duration::from_millis(10),
        );
        assert!(ingestor.poll_once().await.is_empty());
    }
}
