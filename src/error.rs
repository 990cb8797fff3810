//! 에러 타입 정의

use thiserror::Error;

/// SplitFetch 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("파일 없음: {0}")]
    FileNotFound(String),

    #[error("제공 가능한 파일 없음")]
    NoFilesAvailable,

    #[error("매니페스트 파싱 실패 (line {line}): {reason}")]
    ManifestParse { line: usize, reason: String },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFileName(String),

    #[error("유효하지 않은 명령: {0}")]
    InvalidCommand(String),

    #[error("잘못된 프레임: {0}")]
    MalformedFrame(String),

    #[error("수신 타임아웃: sequence={sequence}")]
    TransferTimeout { sequence: u64 },

    #[error("체크섬 불일치: sequence={sequence}, expected {expected}, got {got}")]
    ChecksumMismatch {
        sequence: u64,
        expected: String,
        got: String,
    },

    #[error("시퀀스 불일치: expected {expected}, got {got}")]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("청크 실패: sequence={sequence}, attempts={attempts}")]
    ChunkFailed { sequence: u64, attempts: u32 },

    #[error("연결 실패: {0}")]
    ConnectionFailure(String),

    #[error("서버 에러 응답: {0}")]
    Remote(String),
}

impl Error {
    /// 같은 요청을 다시 보내면 회복될 수 있는 에러인지
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransferTimeout { .. }
                | Error::ChecksumMismatch { .. }
                | Error::SequenceMismatch { .. }
                | Error::MalformedFrame(_)
                | Error::Remote(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
