//! # SplitFetch
//!
//! 단일 서버에서 여러 클라이언트로 파일을 배포하는 청크 전송 프로토콜
//!
//! ## 핵심 특징
//! - **스트림 바인딩 (TCP)**: 파일을 정확히 4개 범위로 분할, 범위마다 독립 연결로 동시 수신
//! - **데이터그램 바인딩 (UDP)**: 고정 크기 청크 + MD5 체크섬 + ACK, 손실/손상 시 재요청
//! - **동시성 제한**: 세마포어로 동시 청크 요청 수 제한 (기본 1)
//! - **직접 조립**: 각 단위를 출력 파일의 정확한 오프셋에 기록, 범위가 겹치지 않으므로 락 불필요
//! - **커밋 단계**: `<name>.part`에 기록 후 완료 시에만 최종 이름으로 rename

pub mod catalog;
pub mod chunk;
pub mod config;
pub mod datagram;
pub mod error;
pub mod ingest;
pub mod message;
pub mod output;
pub mod partition;
pub mod stats;
pub mod stream;

pub use catalog::{Catalog, CatalogEntry};
pub use chunk::ChunkFrame;
pub use config::Config;
pub use datagram::{DatagramClient, DatagramServer};
pub use error::{Error, Result};
pub use ingest::{FileFetcher, Ingestor};
pub use message::Command;
pub use output::OutputFile;
pub use partition::{ChunkSpan, RangeSpan, TransferDescriptor};
pub use stats::{Binding, TransferReport, TransferStats};
pub use stream::{StreamClient, StreamServer};

/// 스트림 바인딩 기본 포트
pub const DEFAULT_STREAM_PORT: u16 = 65000;

/// 데이터그램 바인딩 기본 포트
pub const DEFAULT_DATAGRAM_PORT: u16 = 5555;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 8192; // 8KB

/// 스트림 바인딩 분할 수 (고정)
pub const STREAM_PART_COUNT: usize = 4;

/// 청크 프레임 헤더(`"<seq> <md5>|"`)에 허용하는 최대 바이트
pub const FRAME_HEADER_ALLOWANCE: usize = 128;

/// IPv4 UDP 데이터그램 하나에 담을 수 있는 최대 페이로드
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// 1 MiB
pub const MIB: u64 = 1024 * 1024;
