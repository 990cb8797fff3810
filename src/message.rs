//! 프로토콜 명령 정의
//!
//! 두 바인딩 모두 공백 구분 텍스트 명령을 사용한다 (줄바꿈 없음).
//!
//! | 명령 | 스트림 | 데이터그램 |
//! |---|---|---|
//! | `LIST` | O | O |
//! | `SIZE <name>` | O | O |
//! | `DOWNLOAD <name> <offset> <length>` | O | - |
//! | `DOWNLOAD <name> <offset>` | - | O |
//! | `ACK <sequence>` | - | O |

use std::fmt;

use crate::catalog::CatalogEntry;
use crate::partition::Sequence;
use crate::{Error, Result, MIB};

/// 파일 없음 응답
pub const ERROR_FILE_NOT_FOUND: &str = "ERROR: File not found";

/// 빈 카탈로그 응답
pub const ERROR_NO_FILES: &str = "ERROR: No files available.";

/// 알 수 없는 명령 응답
pub const ERROR_INVALID_COMMAND: &str = "ERROR: Invalid command";

/// 에러 응답 접두사
pub const ERROR_PREFIX: &str = "ERROR";

/// 클라이언트 → 서버 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 파일 목록 요청
    List,

    /// 파일 크기 요청
    Size { name: String },

    /// 범위/청크 요청
    ///
    /// `length`가 있으면 스트림 범위 요청, 없으면 데이터그램 청크 요청
    Download {
        name: String,
        offset: u64,
        length: Option<u64>,
    },

    /// 청크 수신 확인
    Ack { sequence: Sequence },
}

impl Command {
    /// 바이트에서 명령 파싱
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidCommand("UTF-8이 아닌 명령".into()))?;
        let parts: Vec<&str> = text.split_whitespace().collect();

        let invalid = || Error::InvalidCommand(text.trim().to_string());
        let number = |s: &str| s.parse::<u64>().map_err(|_| invalid());

        match parts.as_slice() {
            ["LIST"] => Ok(Command::List),
            ["SIZE", name] => Ok(Command::Size {
                name: name.to_string(),
            }),
            ["DOWNLOAD", name, offset] => Ok(Command::Download {
                name: name.to_string(),
                offset: number(offset)?,
                length: None,
            }),
            ["DOWNLOAD", name, offset, length] => Ok(Command::Download {
                name: name.to_string(),
                offset: number(offset)?,
                length: Some(number(length)?),
            }),
            ["ACK", sequence] => Ok(Command::Ack {
                sequence: number(sequence)?,
            }),
            _ => Err(invalid()),
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => write!(f, "LIST"),
            Command::Size { name } => write!(f, "SIZE {name}"),
            Command::Download {
                name,
                offset,
                length: Some(length),
            } => write!(f, "DOWNLOAD {name} {offset} {length}"),
            Command::Download {
                name,
                offset,
                length: None,
            } => write!(f, "DOWNLOAD {name} {offset}"),
            Command::Ack { sequence } => write!(f, "ACK {sequence}"),
        }
    }
}

/// 스트림 바인딩 목록: `"<name> - <size>B"` 줄 단위
pub fn format_stream_listing(entries: &[CatalogEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} - {}B", e.name, e.size))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 데이터그램 바인딩 목록: `"<name> <size/MiB>MB"` 줄 단위
pub fn format_datagram_listing(entries: &[CatalogEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} {}MB", e.name, e.size / MIB))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `LIST` 응답 해석
pub fn parse_listing_reply(reply: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(reply).into_owned();
    if text == ERROR_NO_FILES {
        return Err(Error::NoFilesAvailable);
    }
    if text.starts_with(ERROR_PREFIX) {
        return Err(Error::Remote(text));
    }
    Ok(text)
}

/// `SIZE` 응답 해석
pub fn parse_size_reply(name: &str, reply: &[u8]) -> Result<u64> {
    let text = String::from_utf8_lossy(reply);
    let text = text.trim();
    if text == ERROR_FILE_NOT_FOUND {
        return Err(Error::FileNotFound(name.to_string()));
    }
    if text.starts_with(ERROR_PREFIX) {
        return Err(Error::Remote(text.to_string()));
    }
    text.parse()
        .map_err(|_| Error::Remote(format!("잘못된 SIZE 응답: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(b"LIST").unwrap(), Command::List);
        assert_eq!(
            Command::parse(b"SIZE video.mp4").unwrap(),
            Command::Size {
                name: "video.mp4".into()
            }
        );
        assert_eq!(
            Command::parse(b"DOWNLOAD a.bin 8192").unwrap(),
            Command::Download {
                name: "a.bin".into(),
                offset: 8192,
                length: None
            }
        );
        assert_eq!(
            Command::parse(b"DOWNLOAD a.bin 100 25").unwrap(),
            Command::Download {
                name: "a.bin".into(),
                offset: 100,
                length: Some(25)
            }
        );
        assert_eq!(Command::parse(b"ACK 12").unwrap(), Command::Ack { sequence: 12 });
    }

    #[test]
    fn test_display_matches_wire() {
        let cmd = Command::Download {
            name: "a.bin".into(),
            offset: 16384,
            length: None,
        };
        assert_eq!(cmd.to_bytes(), b"DOWNLOAD a.bin 16384");
        assert_eq!(Command::parse(&cmd.to_bytes()).unwrap(), cmd);
    }

    #[test]
    fn test_invalid_commands() {
        let cases: [&[u8]; 6] = [b"FOO", b"SIZE", b"DOWNLOAD a.bin x", b"ACK", b"", b"LIST extra"];
        for raw in cases {
            assert!(matches!(Command::parse(raw), Err(Error::InvalidCommand(_))));
        }
    }

    #[test]
    fn test_listings() {
        let entries = vec![
            CatalogEntry::new("a.bin", 10 * MIB),
            CatalogEntry::new("b.txt", 512),
        ];
        assert_eq!(format_stream_listing(&entries), "a.bin - 10485760B\nb.txt - 512B");
        assert_eq!(format_datagram_listing(&entries), "a.bin 10MB\nb.txt 0MB");
    }

    #[test]
    fn test_size_reply() {
        assert_eq!(parse_size_reply("a", b"1024").unwrap(), 1024);
        assert!(matches!(
            parse_size_reply("a", ERROR_FILE_NOT_FOUND.as_bytes()),
            Err(Error::FileNotFound(name)) if name == "a"
        ));
        assert!(matches!(parse_size_reply("a", b"ERROR: boom"), Err(Error::Remote(_))));
    }

    #[test]
    fn test_listing_reply() {
        assert!(matches!(
            parse_listing_reply(ERROR_NO_FILES.as_bytes()),
            Err(Error::NoFilesAvailable)
        ));
        assert_eq!(parse_listing_reply(b"a.bin 1MB").unwrap(), "a.bin 1MB");
    }
}
