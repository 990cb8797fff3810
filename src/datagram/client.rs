//! 데이터그램 클라이언트
//!
//! 청크마다: `Request → AwaitResponse(timeout) → Validate → Ack | Retry`,
//! retry budget을 다 쓰면 그 청크는 실패로 기록하고 나머지 청크는 계속 진행한다.
//!
//! 청크마다 태스크를 만들지만 세마포어가 동시 진행 수를 `max_in_flight_chunks`로 제한한다.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunk::{ChunkFrame, DatagramReply};
use crate::ingest::FileFetcher;
use crate::message::{parse_listing_reply, parse_size_reply, Command};
use crate::output::OutputFile;
use crate::partition::{ChunkSpan, TransferDescriptor};
use crate::stats::{
    render_chunk_progress, Binding, InFlightGuard, SharedStats, TransferReport, TransferStats,
};
use crate::{Config, Error, Result};

/// 청크 하나의 최종 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// 검증 통과, 기록 및 ACK 완료
    Accepted { bytes: usize },

    /// 서버에 해당 오프셋 데이터 없음
    EndOfFile,
}

/// UDP 파일 클라이언트
#[derive(Debug, Clone)]
pub struct DatagramClient {
    server_addr: SocketAddr,
    config: Config,
    limiter: Arc<Semaphore>,
}

impl DatagramClient {
    pub fn new(server_addr: SocketAddr, config: Config) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_in_flight_chunks));
        Self {
            server_addr,
            config,
            limiter,
        }
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn bind_socket(&self) -> Result<UdpSocket> {
        let local: SocketAddr = if self.server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Ok(UdpSocket::bind(local).await?)
    }

    /// 서버에서 온 데이터그램인지
    ///
    /// 와일드카드 주소에 바인딩된 다중 인터페이스 서버는 다른 IP로 응답할 수 있으므로
    /// 포트만 비교한다.
    fn is_from_server(&self, from: SocketAddr) -> bool {
        from.port() == self.server_addr.port()
    }

    /// 서버에서 온 데이터그램 하나 수신 (타임아웃 시 `None`)
    async fn recv_from_server(&self, socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<usize>> {
        let deadline = tokio::time::Instant::now() + self.config.recv_timeout();
        loop {
            match tokio::time::timeout_at(deadline, socket.recv_from(buf)).await {
                Ok(Ok((len, from))) if self.is_from_server(from) => return Ok(Some(len)),
                Ok(Ok((_, from))) => debug!("알 수 없는 송신자 무시: {}", from),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Ok(None),
            }
        }
    }

    /// 제어 명령 (LIST / SIZE) 요청-응답 한 번
    async fn control(&self, command: &Command) -> Result<Vec<u8>> {
        let socket = self.bind_socket().await?;
        socket.send_to(&command.to_bytes(), self.server_addr).await?;

        let mut buf = vec![0u8; self.config.control_buffer_size];
        match self.recv_from_server(&socket, &mut buf).await? {
            Some(len) => {
                buf.truncate(len);
                Ok(buf)
            }
            None => Err(Error::ConnectionFailure(format!(
                "{}: `{}` 응답 없음",
                self.server_addr, command
            ))),
        }
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

    /// 응답 하나를 받아 검증
    ///
    /// `Ok(None)`은 END, 재시도 대상 실패는 `Err`.
    async fn await_chunk(
        &self,
        socket: &UdpSocket,
        buf: &mut [u8],
        span: ChunkSpan,
    ) -> Result<Option<ChunkFrame>> {
        let len = self
            .recv_from_server(socket, buf)
            .await?
            .ok_or(Error::TransferTimeout {
                sequence: span.sequence,
            })?;

        match DatagramReply::from_bytes(&buf[..len])? {
            DatagramReply::End => Ok(None),
            DatagramReply::Error(text) => Err(Error::Remote(text)),
            DatagramReply::Frame(frame) => {
                frame.validate(span.sequence)?;
                // 다른 청크 구간을 덮어쓰지 않도록
                if frame.payload.len() as u64 > span.len {
                    return Err(Error::MalformedFrame(format!(
                        "payload {} bytes > chunk {} bytes",
                        frame.payload.len(),
                        span.len
                    )));
                }
                Ok(Some(frame))
            }
        }
    }

    /// 청크 하나 수신 (retry budget 내에서 재요청)
    pub async fn fetch_chunk(
        &self,
        name: &str,
        span: ChunkSpan,
        output: &OutputFile,
        stats: &SharedStats,
    ) -> Result<ChunkOutcome> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::ConnectionFailure("limiter closed".into()))?;
        let _in_flight = InFlightGuard::enter(stats);

        let socket = self.bind_socket().await?;
        let request = Command::Download {
            name: name.to_string(),
            offset: span.offset,
            length: None,
        }
        .to_bytes();
        let mut buf = vec![0u8; self.config.frame_buffer_size()];

        for attempt in 1..=self.config.max_retries {
            socket.send_to(&request, self.server_addr).await?;
            stats.write().requests_sent += 1;

            match self.await_chunk(&socket, &mut buf, span).await {
                Ok(None) => {
                    debug!("Chunk {}: end of file", span.sequence);
                    return Ok(ChunkOutcome::EndOfFile);
                }
                Ok(Some(frame)) => {
                    output.write_at(span.offset, &frame.payload).await?;
                    let ack = Command::Ack {
                        sequence: frame.sequence,
                    };
                    socket.send_to(&ack.to_bytes(), self.server_addr).await?;
                    return Ok(ChunkOutcome::Accepted {
                        bytes: frame.payload.len(),
                    });
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Chunk {}: {}, retrying ({}/{})",
                        span.sequence, e, attempt, self.config.max_retries
                    );
                    stats.write().record_rejection(&e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ChunkFailed {
            sequence: span.sequence,
            attempts: self.config.max_retries,
        })
    }

    /// 파일 하나 다운로드
    pub async fn download(&self, name: &str, output_dir: &Path) -> Result<TransferReport> {
        self.download_with_stats(name, output_dir)
            .await
            .map(|(report, _)| report)
    }

    /// 파일 하나 다운로드 + 전송 통계
    pub async fn download_with_stats(
        &self,
        name: &str,
        output_dir: &Path,
    ) -> Result<(TransferReport, TransferStats)> {
        let start = Instant::now();

        let total_size = self.size_of(name).await?;
        let descriptor = TransferDescriptor::for_datagram(name, total_size, self.config.chunk_size);
        let output = OutputFile::preallocate(output_dir, name, total_size).await?;
        let stats: SharedStats = Arc::new(RwLock::new(TransferStats::new(descriptor.part_count)));

        info!(
            "Downloading {} ({} bytes, {} chunks, {} in flight)",
            name, total_size, descriptor.part_count, self.config.max_in_flight_chunks
        );

        let handles: Vec<(ChunkSpan, JoinHandle<Result<ChunkOutcome>>)> = descriptor
            .chunks()
            .map(|span| {
                let client = self.clone();
                let name = name.to_string();
                let output = output.clone();
                let stats = stats.clone();
                let handle = tokio::spawn(async move {
                    client.fetch_chunk(&name, span, &output, &stats).await
                });
                (span, handle)
            })
            .collect();

        let total = descriptor.part_count;
        let log_every = (total / 10).max(1);
        let mut done = 0u64;
        let mut failed_units = Vec::new();

        for (span, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::ConnectionFailure(format!("task: {e}"))),
            };

            match outcome {
                Ok(ChunkOutcome::Accepted { bytes }) => {
                    done += 1;
                    let mut s = stats.write();
                    s.completed_units += 1;
                    s.total_bytes += bytes as u64;
                    if (bytes as u64) < span.len {
                        warn!("Chunk {}: short payload {}/{} bytes", span.sequence, bytes, span.len);
                    }
                }
                Ok(ChunkOutcome::EndOfFile) => {
                    done += 1;
                    stats.write().completed_units += 1;
                    warn!("Chunk {}: server reported end of file", span.sequence);
                }
                Err(e) => {
                    error!("Chunk {} failed: {}", span.sequence, e);
                    stats.write().failed_units += 1;
                    failed_units.push(span.sequence);
                }
            }

            let line = render_chunk_progress(done, total);
            if done % log_every == 0 {
                info!("Downloading {}: {}", name, line);
            } else {
                debug!("Downloading {}: {}", name, line);
            }
        }

        // 완료 조건: 실패 청크 없음 + 디스크 크기 일치
        // 미리 잡아 둔 파일이라 짧은 청크/END가 남긴 구멍은 기록 바이트로 확인
        let on_disk = output.len().await?;
        let written = stats.read().total_bytes;
        let complete = failed_units.is_empty() && on_disk == total_size && written == total_size;
        let path = if complete {
            output.commit().await?
        } else {
            output.part_path().to_path_buf()
        };

        let stats = stats.read().clone();
        let report = TransferReport {
            file_name: name.to_string(),
            binding: Binding::Datagram,
            total_size,
            units_total: total,
            units_completed: stats.completed_units,
            failed_units,
            bytes_written: stats.total_bytes,
            complete,
            path,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!("{}", stats.summary());
        if report.complete {
            info!("{}", report.summary());
        } else {
            error!("{}", report.summary());
        }
        Ok((report, stats))
    }
}

#[async_trait]
impl FileFetcher for DatagramClient {
    async fn list(&self) -> Result<String> {
        DatagramClient::list(self).await
    }

    async fn fetch(&self, name: &str, output_dir: &Path) -> Result<TransferReport> {
        self.download(name, output_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_source_matches_on_port() {
        let client = DatagramClient::new("192.0.2.1:5555".parse().unwrap(), Config::default());
        assert!(client.is_from_server("192.0.2.1:5555".parse().unwrap()));
        assert!(client.is_from_server("198.51.100.7:5555".parse().unwrap()));
        assert!(!client.is_from_server("192.0.2.1:40000".parse().unwrap()));
    }
}
