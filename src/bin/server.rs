//! SplitFetch 서버
//!
//! 매니페스트에 적힌 파일을 스트림(TCP) 또는 데이터그램(UDP) 바인딩으로 제공
//!
//! 사용법:
//!   cargo run --release --bin splitfetch-server -- [OPTIONS]
//!
//! 예시:
//!   # TCP, 기본 포트 65000
//!   cargo run --release --bin splitfetch-server -- --manifest file_list.txt --root ./files
//!
//!   # UDP, 기본 포트 5555, 설정 파일 사용
//!   cargo run --release --bin splitfetch-server -- -t datagram --config lan.toml

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use splitfetch::{
    Catalog, Config, DatagramServer, StreamServer, DEFAULT_DATAGRAM_PORT, DEFAULT_STREAM_PORT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// TCP, 4분할 범위 전송
    Stream,
    /// UDP, 체크섬 청크 + ACK
    Datagram,
}

/// SplitFetch 파일 서버
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// 전송 바인딩
    #[arg(short, long, value_enum, default_value_t = Transport::Stream)]
    transport: Transport,

    /// 바인드 주소 (기본: 0.0.0.0:<바인딩 기본 포트>)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// 제공할 파일 목록
    #[arg(short, long, default_value = "file_list.txt")]
    manifest: PathBuf,

    /// 파일이 있는 디렉터리
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// TOML 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 디버그 로그 출력
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!("SplitFetch Server starting...");
    info!("Transport: {:?}", args.transport);
    info!("Manifest: {:?} (root {:?})", args.manifest, args.root);

    match args.transport {
        Transport::Stream => {
            let catalog = Arc::new(Catalog::load_stream_manifest(&args.manifest, &args.root)?);
            let bind = args
                .bind
                .unwrap_or_else(|| (Ipv4Addr::UNSPECIFIED, DEFAULT_STREAM_PORT).into());
            StreamServer::bind(bind, catalog, config).await?.serve().await?;
        }
        Transport::Datagram => {
            info!("Chunk size: {} bytes", config.chunk_size);
            info!(
                "ACK timeout: {:?} x {} sends",
                config.ack_timeout(),
                config.ack_retries
            );
            let catalog = Arc::new(Catalog::load_datagram_manifest(&args.manifest, &args.root)?);
            let bind = args
                .bind
                .unwrap_or_else(|| (Ipv4Addr::UNSPECIFIED, DEFAULT_DATAGRAM_PORT).into());
            DatagramServer::bind(bind, catalog, config).await?.serve().await?;
        }
    }

    Ok(())
}
