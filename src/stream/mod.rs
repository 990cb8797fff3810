//! 스트림 바인딩 (TCP)
//!
//! 전송이 순서/도착을 보장하므로 재시도 없이 파일을 4개 범위로 나눠 동시에 받는다.

mod client;
mod server;

pub use client::StreamClient;
pub use server::StreamServer;
