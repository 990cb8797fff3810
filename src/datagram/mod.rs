//! 데이터그램 바인딩 (UDP)
//!
//! 손실/순서 뒤바뀜이 있는 전송 위에서 고정 크기 청크를
//! `요청 → 응답(타임아웃) → 검증 → ACK | 재요청` 으로 하나씩 받는다.

mod client;
mod server;

pub use client::{ChunkOutcome, DatagramClient};
pub use server::DatagramServer;
