//! 데이터그램 청크 프레임
//!
//! 와이어 포맷: `"<sequence> <md5-hex>" | <payload>`
//! - 헤더는 ASCII, 첫 번째 `|`에서 분리
//! - payload는 임의 바이트 (`|` 포함 가능)

use bytes::Bytes;
use md5::{Digest, Md5};

use crate::partition::Sequence;
use crate::{Error, Result};

/// 파일 끝 응답
pub const END_MARKER: &[u8] = b"END";

/// 서버측 실패 응답
pub const ERROR_MARKER: &[u8] = b"ERROR";

/// 헤더와 payload 구분자
pub const FRAME_DELIMITER: u8 = b'|';

/// payload의 MD5 체크섬 (소문자 hex)
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// 청크 응답 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    /// 시퀀스 번호 (`offset / chunk_size`)
    pub sequence: Sequence,

    /// 서버가 계산한 체크섬
    pub checksum: String,

    /// 실제 데이터
    pub payload: Bytes,
}

impl ChunkFrame {
    /// 새 프레임 생성 (체크섬 계산 포함)
    pub fn new(sequence: Sequence, payload: Bytes) -> Self {
        Self {
            sequence,
            checksum: checksum(&payload),
            payload,
        }
    }

    /// 프레임을 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = format!("{} {}", self.sequence, self.checksum);
        let mut buf = Vec::with_capacity(header.len() + 1 + self.payload.len());
        buf.extend_from_slice(header.as_bytes());
        buf.push(FRAME_DELIMITER);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 바이트에서 프레임 역직렬화
    ///
    /// 체크섬은 검증하지 않는다. `validate` 참고.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let split = bytes
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
            .ok_or_else(|| Error::MalformedFrame("구분자 없음".into()))?;

        let header = std::str::from_utf8(&bytes[..split])
            .map_err(|_| Error::MalformedFrame("헤더가 UTF-8이 아님".into()))?;

        let mut fields = header.split_whitespace();
        let (Some(sequence), Some(checksum), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::MalformedFrame(format!("헤더 형식 오류: {header:?}")));
        };

        let sequence = sequence
            .parse()
            .map_err(|_| Error::MalformedFrame(format!("시퀀스 번호 오류: {sequence:?}")))?;

        Ok(Self {
            sequence,
            checksum: checksum.to_ascii_lowercase(),
            payload: Bytes::copy_from_slice(&bytes[split + 1..]),
        })
    }

    /// 체크섬 검증
    pub fn verify_checksum(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// 수신측 검증: 시퀀스 번호와 체크섬이 모두 맞아야 수락
    pub fn validate(&self, expected: Sequence) -> Result<()> {
        if self.sequence != expected {
            return Err(Error::SequenceMismatch {
                expected,
                got: self.sequence,
            });
        }

        let actual = checksum(&self.payload);
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch {
                sequence: self.sequence,
                expected: self.checksum.clone(),
                got: actual,
            });
        }

        Ok(())
    }
}

/// `DOWNLOAD` 요청에 대한 데이터그램 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramReply {
    /// 요청 오프셋에 남은 데이터 없음
    End,

    /// 서버가 청크를 읽지 못함
    Error(String),

    /// 데이터 청크
    Frame(ChunkFrame),
}

impl DatagramReply {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            DatagramReply::End => END_MARKER.to_vec(),
            DatagramReply::Error(_) => ERROR_MARKER.to_vec(),
            DatagramReply::Frame(frame) => frame.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes == END_MARKER {
            return Ok(DatagramReply::End);
        }
        if bytes.starts_with(ERROR_MARKER) {
            return Ok(DatagramReply::Error(
                String::from_utf8_lossy(bytes).into_owned(),
            ));
        }
        ChunkFrame::from_bytes(bytes).map(DatagramReply::Frame)
    }
}
