//! SplitFetch 클라이언트
//!
//! 입력 파일에 적힌 이름을 감시하면서 한 파일씩 다운로드
//!
//! 사용법:
//!   cargo run --release --bin splitfetch-client -- [OPTIONS]
//!
//! 예시:
//!   # TCP, 127.0.0.1:65000
//!   cargo run --release --bin splitfetch-client -- --server 127.0.0.1 --input input.txt
//!
//!   # UDP, 동시 청크 8개, 한 번만 폴링
//!   cargo run --release --bin splitfetch-client -- -t datagram --max-in-flight 8 --once

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use splitfetch::{
    Config, DatagramClient, FileFetcher, Ingestor, StreamClient, DEFAULT_DATAGRAM_PORT,
    DEFAULT_STREAM_PORT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// TCP, 4분할 범위 전송
    Stream,
    /// UDP, 체크섬 청크 + ACK
    Datagram,
}

impl Transport {
    fn default_port(self) -> u16 {
        match self {
            Transport::Stream => DEFAULT_STREAM_PORT,
            Transport::Datagram => DEFAULT_DATAGRAM_PORT,
        }
    }
}

/// SplitFetch 파일 클라이언트
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// 전송 바인딩
    #[arg(short, long, value_enum, default_value_t = Transport::Stream)]
    transport: Transport,

    /// 서버 주소 (`IP` 또는 `IP:PORT`, 포트 생략 시 바인딩 기본 포트)
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    /// 요청 파일 목록 (한 줄에 하나)
    #[arg(short, long, default_value = "input.txt")]
    input: PathBuf,

    /// 다운로드 디렉터리
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// TOML 설정 파일
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 동시 청크 요청 수 (데이터그램)
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// 청크당 최대 요청 횟수 (데이터그램)
    #[arg(long)]
    retries: Option<u32>,

    /// 청크 응답 대기 타임아웃 (밀리초, 데이터그램)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// 한 번만 폴링하고 종료
    #[arg(long)]
    once: bool,

    /// 디버그 로그 출력
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn server_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        if let Ok(addr) = self.server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let ip: IpAddr = self.server.parse()?;
        Ok(SocketAddr::new(ip, self.transport.default_port()))
    }

    fn config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(n) = self.max_in_flight {
            config.max_in_flight_chunks = n;
        }
        if let Some(n) = self.retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.timeout_ms {
            config.recv_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run<F: FileFetcher>(
    fetcher: F,
    args: &Args,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match fetcher.list().await {
        Ok(listing) => info!("Available files:\n{}", listing),
        Err(e) => warn!("Failed to list files: {}", e),
    }

    let mut ingestor = Ingestor::new(fetcher, &args.input, &args.output, config.poll_interval());
    if args.once {
        let reports = ingestor.poll_once().await;
        let complete = reports.iter().filter(|r| r.complete).count();
        info!("Done: {}/{} transfers complete", complete, reports.len());
    } else {
        ingestor.run().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let server_addr = args.server_addr()?;
    let config = args.config()?;

    info!("SplitFetch Client starting...");
    info!("Transport: {:?}", args.transport);
    info!("Server address: {}", server_addr);
    info!("Input: {:?}, output: {:?}", args.input, args.output);

    match args.transport {
        Transport::Stream => {
            run(StreamClient::new(server_addr, config.clone()), &args, &config).await
        }
        Transport::Datagram => {
            info!(
                "Chunk size: {} bytes, {} in flight, {} retries, timeout {:?}",
                config.chunk_size,
                config.max_in_flight_chunks,
                config.max_retries,
                config.recv_timeout()
            );
            run(DatagramClient::new(server_addr, config.clone()), &args, &config).await
        }
    }
}
