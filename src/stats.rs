//! 전송 통계

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use crate::partition::RangeSpan;
use crate::{Error, STREAM_PART_COUNT};

/// 전송 바인딩 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    /// TCP, 4분할 범위
    Stream,

    /// UDP, 체크섬 청크
    Datagram,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Stream => write!(f, "stream"),
            Binding::Datagram => write!(f, "datagram"),
        }
    }
}

/// 한 파일 전송의 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전체 단위 수 (범위 또는 청크)
    pub total_units: u64,

    /// 완료된 단위 수
    pub completed_units: u64,

    /// 실패한 단위 수
    pub failed_units: u64,

    /// 기록된 바이트
    pub total_bytes: u64,

    /// 보낸 요청 수 (재요청 포함)
    pub requests_sent: u64,

    /// 응답 타임아웃 수
    pub timeouts: u64,

    /// 체크섬 불일치 수
    pub checksum_mismatches: u64,

    /// 시퀀스 불일치 수
    pub sequence_mismatches: u64,

    /// 해석 불가 응답 / 서버 에러 응답 수
    pub bad_replies: u64,

    /// 현재 진행 중인 단위 수
    pub in_flight: usize,

    /// 동시 진행 최대치
    pub peak_in_flight: usize,

    /// 단위별 (시작, 종료) 시각
    pub fetch_intervals: Vec<(Instant, Instant)>,
}

impl TransferStats {
    pub fn new(total_units: u64) -> Self {
        Self {
            start_time: Instant::now(),
            total_units,
            completed_units: 0,
            failed_units: 0,
            total_bytes: 0,
            requests_sent: 0,
            timeouts: 0,
            checksum_mismatches: 0,
            sequence_mismatches: 0,
            bad_replies: 0,
            in_flight: 0,
            peak_in_flight: 0,
            fetch_intervals: Vec::new(),
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재요청 원인 기록
    pub fn record_rejection(&mut self, err: &Error) {
        match err {
            Error::TransferTimeout { .. } => self.timeouts += 1,
            Error::ChecksumMismatch { .. } => self.checksum_mismatches += 1,
            Error::SequenceMismatch { .. } => self.sequence_mismatches += 1,
            _ => self.bad_replies += 1,
        }
    }

    /// 재요청 총 횟수
    pub fn retries(&self) -> u64 {
        self.timeouts + self.checksum_mismatches + self.sequence_mismatches + self.bad_replies
    }

    /// 진행 중인 단위들이 시간상 겹친 적이 있는지
    pub fn has_overlapping_fetches(&self) -> bool {
        let mut intervals = self.fetch_intervals.clone();
        intervals.sort_by_key(|(start, _)| *start);
        intervals.windows(2).any(|w| w[1].0 < w[0].1)
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Units: {}/{} ({} failed) | Bytes: {} | Throughput: {:.2} MB/s | Requests: {} | Timeouts: {} | Checksum: {} | Sequence: {}",
            self.elapsed().as_secs_f64(),
            self.completed_units,
            self.total_units,
            self.failed_units,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.requests_sent,
            self.timeouts,
            self.checksum_mismatches,
            self.sequence_mismatches,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(0)
    }
}

/// 태스크 간 공유용 통계 핸들
pub type SharedStats = Arc<RwLock<TransferStats>>;

/// 진행 중 단위 게이지 (drop 시 감소 + 구간 기록)
pub struct InFlightGuard {
    stats: SharedStats,
    entered_at: Instant,
}

impl InFlightGuard {
    pub fn enter(stats: &SharedStats) -> Self {
        {
            let mut s = stats.write();
            s.in_flight += 1;
            s.peak_in_flight = s.peak_in_flight.max(s.in_flight);
        }
        Self {
            stats: stats.clone(),
            entered_at: Instant::now(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut s = self.stats.write();
        s.in_flight -= 1;
        s.fetch_intervals.push((self.entered_at, Instant::now()));
    }
}

/// 스트림 바인딩 4개 범위의 진행률
#[derive(Debug)]
pub struct RangeProgress {
    expected: [u64; STREAM_PART_COUNT],
    received: [AtomicU64; STREAM_PART_COUNT],
}

impl RangeProgress {
    pub fn new(ranges: &[RangeSpan; STREAM_PART_COUNT]) -> Self {
        Self {
            expected: std::array::from_fn(|i| ranges[i].len),
            received: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// 범위의 누적 수신 바이트 갱신
    pub fn record(&self, index: usize, received: u64) {
        self.received[index].store(received, Ordering::Relaxed);
    }

    pub fn percents(&self) -> [f64; STREAM_PART_COUNT] {
        std::array::from_fn(|i| {
            if self.expected[i] == 0 {
                return 100.0;
            }
            self.received[i].load(Ordering::Relaxed) as f64 / self.expected[i] as f64 * 100.0
        })
    }

    /// `Downloading <file> progress: Part 1: 12.50%  Part 2: ...`
    pub fn render(&self, file_name: &str) -> String {
        let mut line = format!("Downloading {file_name} progress: ");
        for (i, p) in self.percents().iter().enumerate() {
            line.push_str(&format!("Part {}: {:.2}%  ", i + 1, p));
        }
        line
    }
}

/// 데이터그램 청크 진행률 한 줄
pub fn render_chunk_progress(done: u64, total: u64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 / total as f64 * 100.0
    };
    format!("{done}/{total} chunks - {percent:.2}% complete")
}

/// 한 파일 다운로드 결과
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub file_name: String,
    pub binding: Binding,
    pub total_size: u64,
    pub units_total: u64,
    pub units_completed: u64,

    /// 실패한 단위 (범위 인덱스 또는 청크 시퀀스 번호)
    pub failed_units: Vec<u64>,

    pub bytes_written: u64,

    /// 모든 단위 성공 + 크기 일치 → 최종 이름으로 커밋됨
    pub complete: bool,

    /// 완료 시 최종 경로, 아니면 `.part` 경로
    pub path: PathBuf,

    pub elapsed_ms: u64,
}

impl TransferReport {
    pub fn summary(&self) -> String {
        format!(
            "{} [{}]: {} | {}/{} units | {} / {} bytes | {} ms | {:?}",
            self.file_name,
            self.binding,
            if self.complete { "complete" } else { "INCOMPLETE" },
            self.units_completed,
            self.units_total,
            self.bytes_written,
            self.total_size,
            self.elapsed_ms,
            self.path,
        )
    }
}
