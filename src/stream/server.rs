//! 스트림 서버
//!
//! 연결마다 태스크 하나. 한 연결에서 여러 명령을 처리하되,
//! `DOWNLOAD` 응답 후에는 연결을 닫아 범위 끝을 알린다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::message::{
    format_stream_listing, Command, ERROR_FILE_NOT_FOUND, ERROR_INVALID_COMMAND, ERROR_NO_FILES,
};
use crate::{Config, Result};

/// 다음 명령을 계속 받을지 여부
enum Flow {
    Continue,
    Close,
}

/// TCP 파일 서버
pub struct StreamServer {
    listener: TcpListener,
    catalog: Arc<Catalog>,
    config: Config,
}

impl StreamServer {
    /// 리스너 바인딩
    pub async fn bind(bind_addr: SocketAddr, catalog: Arc<Catalog>, config: Config) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            listener,
            catalog,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 연결 수락 루프
    pub async fn serve(self) -> Result<()> {
        info!(
            "Stream server listening on {} ({} files)",
            self.local_addr()?,
            self.catalog.len()
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("클라이언트 연결: {}", peer);

            let catalog = self.catalog.clone();
            let command_buffer_size = self.config.command_buffer_size;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &catalog, command_buffer_size).await {
                    warn!("연결 처리 에러 ({}): {}", peer, e);
                }
                debug!("클라이언트 연결 종료: {}", peer);
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    catalog: &Catalog,
    command_buffer_size: usize,
) -> Result<()> {
    let mut buf = vec![0u8; command_buffer_size];

    loop {
        let len = stream.read(&mut buf).await?;
        if len == 0 {
            return Ok(());
        }

        let flow = match Command::parse(&buf[..len]) {
            Ok(command) => respond(&mut stream, command, catalog).await?,
            Err(e) => {
                debug!("{}", e);
                stream.write_all(ERROR_INVALID_COMMAND.as_bytes()).await?;
                Flow::Continue
            }
        };

        if let Flow::Close = flow {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

async fn respond(stream: &mut TcpStream, command: Command, catalog: &Catalog) -> Result<Flow> {
    match command {
        Command::List => {
            let reply = match catalog.list() {
                Ok(entries) => format_stream_listing(entries),
                Err(_) => ERROR_NO_FILES.to_string(),
            };
            stream.write_all(reply.as_bytes()).await?;
        }

        Command::Size { name } => {
            let reply = match catalog.size_of(&name) {
                Ok(size) => size.to_string(),
                Err(_) => ERROR_FILE_NOT_FOUND.to_string(),
            };
            stream.write_all(reply.as_bytes()).await?;
        }

        Command::Download {
            name,
            offset,
            length: Some(length),
        } => {
            if !catalog.contains(&name) {
                stream.write_all(ERROR_FILE_NOT_FOUND.as_bytes()).await?;
                return Ok(Flow::Close);
            }

            match catalog.open_at(&name, offset).await {
                Ok(file) => {
                    let sent = tokio::io::copy(&mut file.take(length), stream).await?;
                    debug!("범위 전송: {} offset={} {}/{} bytes", name, offset, sent, length);
                }
                Err(e) => {
                    warn!("파일 읽기 실패 ({}): {}", name, e);
                    stream.write_all(format!("ERROR: {e}").as_bytes()).await?;
                }
            }
            return Ok(Flow::Close);
        }

        Command::Download { length: None, .. } | Command::Ack { .. } => {
            stream.write_all(ERROR_INVALID_COMMAND.as_bytes()).await?;
        }
    }

    Ok(Flow::Continue)
}
