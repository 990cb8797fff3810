//! 데이터그램 서버
//!
//! - 수신 루프는 명령만 해석하고, 청크 전송은 별도 태스크에서 처리
//! - 청크를 보낸 뒤 `ACK <seq>`가 올 때까지 `ack_timeout`마다 같은 프레임 재전송
//!   (최대 `ack_retries`회 전송)
//! - 같은 (클라이언트, seq)에 대한 새 `DOWNLOAD`는 이전 대기자를 대체

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::chunk::{ChunkFrame, DatagramReply};
use crate::message::{format_datagram_listing, Command, ERROR_FILE_NOT_FOUND, ERROR_NO_FILES};
use crate::partition::{sequence_for, Sequence};
use crate::{Config, Result};

/// ACK 대기 상태
#[derive(Default)]
struct AckWaiter {
    acked: AtomicBool,
    notify: Notify,
}

/// 청크 전송 결과
enum AckOutcome {
    Acked,
    Superseded,
    Exhausted,
}

/// 서버 공유 상태
struct Shared {
    socket: UdpSocket,
    catalog: Arc<Catalog>,
    config: Config,
    waiters: DashMap<(SocketAddr, Sequence), Arc<AckWaiter>>,
}

/// UDP 파일 서버
pub struct DatagramServer {
    shared: Arc<Shared>,
}

impl DatagramServer {
    /// 소켓 바인딩
    pub async fn bind(bind_addr: SocketAddr, catalog: Arc<Catalog>, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self {
            shared: Arc::new(Shared {
                socket,
                catalog,
                config,
                waiters: DashMap::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.shared.socket.local_addr()?)
    }

    /// 수신 루프
    pub async fn serve(self) -> Result<()> {
        info!(
            "Datagram server listening on {} ({} files, chunk {} bytes)",
            self.local_addr()?,
            self.shared.catalog.len(),
            self.shared.config.chunk_size
        );

        let mut buf = vec![0u8; self.shared.config.command_buffer_size];

        loop {
            match self.shared.socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    if let Err(e) = self.shared.handle_datagram(&buf[..len], addr).await {
                        warn!("메시지 처리 에러 ({}): {}", addr, e);
                    }
                }
                Err(e) => {
                    warn!("수신 에러: {}", e);
                }
            }
        }
    }
}

impl Shared {
    async fn reply(&self, bytes: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket.send_to(bytes, addr).await?;
        Ok(())
    }

    async fn handle_datagram(self: &Arc<Self>, data: &[u8], addr: SocketAddr) -> Result<()> {
        let command = match Command::parse(data) {
            Ok(command) => command,
            Err(e) => {
                debug!("{} ({})", e, addr);
                return self.reply(&DatagramReply::Error(String::new()).to_bytes(), addr).await;
            }
        };

        match command {
            Command::List => {
                let reply = match self.catalog.list() {
                    Ok(entries) => format_datagram_listing(entries),
                    Err(_) => ERROR_NO_FILES.to_string(),
                };
                self.reply(reply.as_bytes(), addr).await
            }

            Command::Size { name } => {
                let reply = match self.catalog.size_of(&name) {
                    Ok(size) => size.to_string(),
                    Err(_) => ERROR_FILE_NOT_FOUND.to_string(),
                };
                self.reply(reply.as_bytes(), addr).await
            }

            Command::Download {
                name,
                offset,
                length: None,
            } => {
                let shared = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = shared.serve_chunk(&name, offset, addr).await {
                        warn!("청크 전송 에러 ({} offset={}): {}", name, offset, e);
                    }
                });
                Ok(())
            }

            Command::Download { length: Some(_), .. } => {
                self.reply(&DatagramReply::Error(String::new()).to_bytes(), addr)
                    .await
            }

            Command::Ack { sequence } => {
                self.handle_ack(addr, sequence);
                Ok(())
            }
        }
    }

    /// 청크 읽기 → END / ERROR / 프레임 전송
    async fn serve_chunk(&self, name: &str, offset: u64, addr: SocketAddr) -> Result<()> {
        let data = match self.catalog.read_at(name, offset, self.config.chunk_size).await {
            Ok(data) => data,
            Err(e) => {
                warn!("청크 읽기 실패 ({} offset={}): {}", name, offset, e);
                let reply = DatagramReply::Error(e.to_string());
                return self.reply(&reply.to_bytes(), addr).await;
            }
        };

        if data.is_empty() {
            return self.reply(&DatagramReply::End.to_bytes(), addr).await;
        }

        let frame = ChunkFrame::new(sequence_for(offset, self.config.chunk_size), Bytes::from(data));
        self.send_until_acked(frame, addr).await
    }

    /// 프레임 전송 후 ACK 대기, 없으면 재전송
    async fn send_until_acked(&self, frame: ChunkFrame, addr: SocketAddr) -> Result<()> {
        let key = (addr, frame.sequence);
        let waiter = Arc::new(AckWaiter::default());
        if let Some(previous) = self.waiters.insert(key, waiter.clone()) {
            // 재요청으로 대체됨
            previous.notify.notify_one();
        }

        let packet = frame.to_bytes();
        let mut outcome = AckOutcome::Exhausted;

        for attempt in 1..=self.config.ack_retries {
            debug!(
                "청크 {} 전송 → {} ({}/{})",
                frame.sequence, addr, attempt, self.config.ack_retries
            );
            self.socket.send_to(&packet, addr).await?;

            match tokio::time::timeout(self.config.ack_timeout(), waiter.notify.notified()).await {
                Ok(()) if waiter.acked.load(Ordering::SeqCst) => {
                    outcome = AckOutcome::Acked;
                    break;
                }
                Ok(()) => {
                    outcome = AckOutcome::Superseded;
                    break;
                }
                Err(_) => {
                    debug!("청크 {} ACK 타임아웃 ({})", frame.sequence, addr);
                }
            }
        }

        self.waiters.remove_if(&key, |_, w| Arc::ptr_eq(w, &waiter));

        match outcome {
            AckOutcome::Acked => debug!("청크 {} 전송 완료 → {}", frame.sequence, addr),
            AckOutcome::Superseded => debug!("청크 {} 재요청으로 대체 → {}", frame.sequence, addr),
            AckOutcome::Exhausted => warn!(
                "청크 {} 전송 실패: {}회 전송 후 ACK 없음 ({})",
                frame.sequence,
                self.config.ack_retries,
                addr
            ),
        }
        Ok(())
    }

    fn handle_ack(&self, addr: SocketAddr, sequence: Sequence) {
        match self.waiters.remove(&(addr, sequence)) {
            Some((_, waiter)) => {
                waiter.acked.store(true, Ordering::SeqCst);
                waiter.notify.notify_one();
            }
            None => debug!("대기 중이 아닌 ACK: {} ({})", sequence, addr),
        }
    }
}
