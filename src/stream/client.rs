//! 스트림 클라이언트
//!
//! `SizeQuery → Partition → 4 × RangeFetch (동시) → Join → WriteOutput`
//!
//! - 범위마다 새 연결, 요청 한 번, 길이만큼 받거나 연결이 닫힐 때까지 읽음
//! - 재시도/타임아웃 없음 (끊기면 그 범위는 짧은 채로 남음)
//! - 4개 버퍼 슬롯은 범위 인덱스로 구분, 슬롯마다 쓰는 태스크는 하나뿐

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ingest::FileFetcher;
use crate::message::{parse_listing_reply, parse_size_reply, Command, ERROR_PREFIX};
use crate::output::OutputFile;
use crate::partition::{RangeSpan, TransferDescriptor};
use crate::stats::{Binding, RangeProgress, TransferReport};
use crate::{Config, Error, Result, STREAM_PART_COUNT};

/// TCP 파일 클라이언트
#[derive(Debug, Clone)]
pub struct StreamClient {
    server_addr: SocketAddr,
    config: Config,
}

impl StreamClient {
    pub fn new(server_addr: SocketAddr, config: Config) -> Self {
        Self {
            server_addr,
            config,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    async fn connect(&self) -> Result<TcpStream> {
        TcpStream::connect(self.server_addr)
            .await
            .map_err(|e| Error::ConnectionFailure(format!("{}: {}", self.server_addr, e)))
    }

    /// 짧은 제어 명령 (LIST / SIZE): 연결, 전송, 응답 한 번 읽기
    async fn control(&self, command: &Command) -> Result<Vec<u8>> {
        let mut stream = self.connect().await?;
        stream.write_all(&command.to_bytes()).await?;

        let mut buf = vec![0u8; self.config.control_buffer_size];
        let len = stream.read(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }

    /// 서버 파일 목록
    pub async fn list(&self) -> Result<String> {
        let reply = self.control(&Command::List).await?;
        parse_listing_reply(&reply)
    }

    /// 파일 크기 조회
    pub async fn size_of(&self, name: &str) -> Result<u64> {
        let reply = self
            .control(&Command::Size {
                name: name.to_string(),
            })
            .await?;
        parse_size_reply(name, &reply)
    }

    /// 범위 하나 수신
    ///
    /// 수신 도중 연결이 끊기면 받은 만큼만 반환한다.
    pub async fn fetch_range(
        &self,
        name: &str,
        span: RangeSpan,
        progress: &RangeProgress,
    ) -> Result<Vec<u8>> {
        if span.len == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self.connect().await?;
        let request = Command::Download {
            name: name.to_string(),
            offset: span.offset,
            length: Some(span.len),
        };
        stream
            .write_all(&request.to_bytes())
            .await
            .map_err(|e| Error::ConnectionFailure(e.to_string()))?;

        // 길이는 서버의 SIZE 응답에서 온 값이므로 한 번 읽을 만큼만 미리 잡음
        let read_size = usize::try_from(span.len)
            .unwrap_or(usize::MAX)
            .min(self.config.stream_read_size);
        let mut data = Vec::with_capacity(read_size);
        let mut buf = vec![0u8; read_size];
        let mut reads = 0usize;

        while (data.len() as u64) < span.len {
            let remaining = span.len - data.len() as u64;
            let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
            match stream.read(&mut buf[..want]).await {
                Ok(0) => break,
                Ok(n) => {
                    reads += 1;
                    data.extend_from_slice(&buf[..n]);
                    progress.record(span.index, data.len() as u64);
                    debug!("{}", progress.render(name));
                }
                Err(e) => {
                    warn!("범위 {} 수신 중단: {}", span.index, e);
                    break;
                }
            }
        }

        if (data.len() as u64) < span.len && reads == 1 {
            if let Some(text) = error_reply(&data) {
                return Err(Error::Remote(text.to_string()));
            }
        }

        Ok(data)
    }

    /// 파일 하나 다운로드
    pub async fn download(&self, name: &str, output_dir: &Path) -> Result<TransferReport> {
        let start = Instant::now();

        let total_size = self.size_of(name).await?;
        let descriptor = TransferDescriptor::for_stream(name, total_size);
        let ranges = descriptor.ranges();
        let output = OutputFile::create(output_dir, name).await?;

        info!("Downloading {} ({} bytes, {} parts)", name, total_size, STREAM_PART_COUNT);

        let progress = Arc::new(RangeProgress::new(&ranges));
        let handles: Vec<JoinHandle<Result<Vec<u8>>>> = ranges
            .iter()
            .map(|&span| {
                let client = self.clone();
                let name = name.to_string();
                let progress = progress.clone();
                tokio::spawn(async move { client.fetch_range(&name, span, &progress).await })
            })
            .collect();

        // Join: 네 범위가 모두 끝날 때까지 대기
        let mut slots: [Vec<u8>; STREAM_PART_COUNT] = Default::default();
        let mut failed_units = Vec::new();

        for (span, handle) in ranges.iter().zip(handles) {
            match handle.await {
                Ok(Ok(data)) => {
                    if (data.len() as u64) < span.len {
                        warn!(
                            "Part {} short: {}/{} bytes",
                            span.index + 1,
                            data.len(),
                            span.len
                        );
                        failed_units.push(span.index as u64);
                    }
                    slots[span.index] = data;
                }
                Ok(Err(e)) => {
                    error!("Part {} failed: {}", span.index + 1, e);
                    failed_units.push(span.index as u64);
                }
                Err(e) => {
                    error!("Part {} task failed: {}", span.index + 1, e);
                    failed_units.push(span.index as u64);
                }
            }
        }

        let bytes_written = output.write_sequential(&slots).await?;
        let complete = failed_units.is_empty() && bytes_written == total_size;
        let path = if complete {
            output.commit().await?
        } else {
            output.part_path().to_path_buf()
        };

        let report = TransferReport {
            file_name: name.to_string(),
            binding: Binding::Stream,
            total_size,
            units_total: STREAM_PART_COUNT as u64,
            units_completed: (STREAM_PART_COUNT - failed_units.len()) as u64,
            failed_units,
            bytes_written,
            complete,
            path,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        if report.complete {
            info!("{}", report.summary());
        } else {
            error!("{}", report.summary());
        }
        Ok(report)
    }
}

/// 한 번에 받은 짧은 응답이 `ERROR: ...` 텍스트인지
///
/// 같은 바이트로 시작하는 실제 데이터는 그대로 둔다.
fn error_reply(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data).ok()?;
    text.strip_prefix(ERROR_PREFIX)?
        .starts_with(':')
        .then_some(text)
}

#[async_trait]
impl FileFetcher for StreamClient {
    async fn list(&self) -> Result<String> {
        StreamClient::list(self).await
    }

    async fn fetch(&self, name: &str, output_dir: &Path) -> Result<TransferReport> {
        self.download(name, output_dir).await
    }
}
