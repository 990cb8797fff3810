//! 프로토콜 설정

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DEFAULT_CHUNK_SIZE};

/// SplitFetch 전송 설정
///
/// 클라이언트와 서버가 같은 `chunk_size`를 써야 시퀀스 번호가 일치한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 데이터그램 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 청크 요청 1회당 응답 대기 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// 청크당 최대 요청 횟수 (retry budget)
    pub max_retries: u32,

    /// 동시에 진행 가능한 청크 요청 수
    /// 1이면 모든 청크 요청이 직렬화됨
    pub max_in_flight_chunks: usize,

    /// 서버가 ACK를 기다리는 시간 (밀리초)
    pub ack_timeout_ms: u64,

    /// 서버의 청크 전송 횟수 (ACK 미수신 시 재전송 포함)
    pub ack_retries: u32,

    /// 스트림 범위 수신 시 한 번에 읽는 최대 바이트
    pub stream_read_size: usize,

    /// 명령 수신 버퍼 크기
    pub command_buffer_size: usize,

    /// LIST / SIZE 응답 수신 버퍼 크기
    pub control_buffer_size: usize,

    /// 요청 파일 목록 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,   // 8KB
            recv_timeout_ms: 60_000,          // 60초
            max_retries: 10,
            max_in_flight_chunks: 1,          // 직렬 전송
            ack_timeout_ms: 60_000,           // 60초
            ack_retries: 5,
            stream_read_size: 1024 * 1024,    // 1MB
            command_buffer_size: 1024,
            control_buffer_size: 4096,
            poll_interval_ms: 5_000,          // 5초
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 로컬 네트워크용 설정
    pub fn lan() -> Self {
        Self {
            recv_timeout_ms: 2_000,
            max_retries: 10,
            max_in_flight_chunks: 8,
            ack_timeout_ms: 2_000,
            ack_retries: 5,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            recv_timeout_ms: 5_000,           // 빠르게 포기하고
            max_retries: 30,                  // 많이 재시도
            max_in_flight_chunks: 1,
            ack_timeout_ms: 5_000,
            ack_retries: 10,
            ..Self::default()
        }
    }

    /// TOML 문자열에서 설정 로드 (누락 필드는 기본값)
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정 로드
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".into()));
        }
        if self.frame_buffer_size() > crate::MAX_DATAGRAM_PAYLOAD {
            return Err(Error::Config(format!(
                "chunk_size {} + frame header {} exceeds UDP payload limit {}",
                self.chunk_size,
                crate::FRAME_HEADER_ALLOWANCE,
                crate::MAX_DATAGRAM_PAYLOAD
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be > 0".into()));
        }
        if self.max_in_flight_chunks == 0 {
            return Err(Error::Config("max_in_flight_chunks must be > 0".into()));
        }
        if self.ack_retries == 0 {
            return Err(Error::Config("ack_retries must be > 0".into()));
        }
        if self.stream_read_size == 0 || self.command_buffer_size == 0 {
            return Err(Error::Config("buffer sizes must be > 0".into()));
        }
        Ok(())
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 청크 응답 데이터그램 수신 버퍼 크기 (헤더 여유분 포함)
    pub fn frame_buffer_size(&self) -> usize {
        self.chunk_size + crate::FRAME_HEADER_ALLOWANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.max_in_flight_chunks, 1);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.recv_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("max_in_flight_chunks = 4\nrecv_timeout_ms = 250\n").unwrap();
        assert_eq!(config.max_in_flight_chunks, 4);
        assert_eq!(config.recv_timeout_ms, 250);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_zero_limiter_rejected() {
        let err = Config::from_toml_str("max_in_flight_chunks = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_oversize_chunk_rejected() {
        let err = Config::from_toml_str("chunk_size = 65536").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // 헤더 여유분까지 정확히 맞는 최대 청크
        let largest = crate::MAX_DATAGRAM_PAYLOAD - crate::FRAME_HEADER_ALLOWANCE;
        let config = Config {
            chunk_size: largest,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        let config = Config {
            chunk_size: largest + 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::lan().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }
}
