//! 파일 분할 규칙
//!
//! - Range: 스트림 바인딩용, 파일을 정확히 4개의 연속 구간으로 분할 (나머지는 마지막 구간에)
//! - Chunk: 데이터그램 바인딩용, 고정 크기 구간 (마지막만 짧을 수 있음)

use crate::STREAM_PART_COUNT;

/// 청크 시퀀스 번호 (`offset / chunk_size`)
pub type Sequence = u64;

/// 스트림 바인딩의 한 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpan {
    /// 범위 인덱스 (0..4)
    pub index: usize,

    /// 시작 오프셋
    pub offset: u64,

    /// 길이
    pub len: u64,
}

impl RangeSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// 데이터그램 바인딩의 한 청크
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub sequence: Sequence,
    pub offset: u64,
    pub len: u64,
}

impl ChunkSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// 한 번의 다운로드에 대한 분할 정보
///
/// 다운로드 시도마다 `total_size`로부터 새로 계산되며 저장되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub file_name: String,
    pub total_size: u64,
    pub part_count: u64,
    pub part_size: u64,
    pub remainder: u64,
}

impl TransferDescriptor {
    /// 스트림 바인딩 분할 (항상 4개)
    pub fn for_stream(file_name: &str, total_size: u64) -> Self {
        let parts = STREAM_PART_COUNT as u64;
        Self {
            file_name: file_name.to_string(),
            total_size,
            part_count: parts,
            part_size: total_size / parts,
            remainder: total_size % parts,
        }
    }

    /// 데이터그램 바인딩 분할
    pub fn for_datagram(file_name: &str, total_size: u64, chunk_size: usize) -> Self {
        let chunk_size = chunk_size as u64;
        Self {
            file_name: file_name.to_string(),
            total_size,
            part_count: total_size.div_ceil(chunk_size),
            part_size: chunk_size,
            remainder: total_size % chunk_size,
        }
    }

    /// 4개 범위 계산 (나머지는 마지막 범위에 더함)
    pub fn ranges(&self) -> [RangeSpan; STREAM_PART_COUNT] {
        std::array::from_fn(|index| {
            let extra = if index == STREAM_PART_COUNT - 1 {
                self.remainder
            } else {
                0
            };
            RangeSpan {
                index,
                offset: index as u64 * self.part_size,
                len: self.part_size + extra,
            }
        })
    }

    /// 청크 목록 (오프셋 순)
    pub fn chunks(&self) -> ChunkSpans {
        ChunkSpans {
            total_size: self.total_size,
            chunk_size: self.part_size,
            next_offset: 0,
        }
    }
}

/// 오프셋에 해당하는 시퀀스 번호
pub fn sequence_for(offset: u64, chunk_size: usize) -> Sequence {
    offset / chunk_size as u64
}

/// 청크 반복자
#[derive(Debug, Clone)]
pub struct ChunkSpans {
    total_size: u64,
    chunk_size: u64,
    next_offset: u64,
}

impl Iterator for ChunkSpans {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<ChunkSpan> {
        if self.next_offset >= self.total_size || self.chunk_size == 0 {
            return None;
        }
        let offset = self.next_offset;
        let len = self.chunk_size.min(self.total_size - offset);
        self.next_offset += len;
        Some(ChunkSpan {
            sequence: offset / self.chunk_size,
            offset,
            len,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.chunk_size == 0 {
            return (0, Some(0));
        }
        let left = self
            .total_size
            .saturating_sub(self.next_offset)
            .div_ceil(self.chunk_size) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkSpans {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ranges_cover(total: u64) {
        let ranges = TransferDescriptor::for_stream("f", total).ranges();
        let mut expected_offset = 0;
        for range in &ranges {
            assert_eq!(range.offset, expected_offset, "gap/overlap at total={total}");
            expected_offset = range.end();
        }
        assert_eq!(ranges.iter().map(|r| r.len).sum::<u64>(), total);
    }

    #[test]
    fn test_stream_ranges_cover_file() {
        for total in [4, 5, 6, 7, 8, 1000, 1001, 1003, 10 * 1024 * 1024 + 3] {
            assert_ranges_cover(total);
        }
    }

    #[test]
    fn test_stream_remainder_goes_to_last_range() {
        let ranges = TransferDescriptor::for_stream("f", 103).ranges();
        assert_eq!(ranges[0].len, 25);
        assert_eq!(ranges[1].len, 25);
        assert_eq!(ranges[2].len, 25);
        assert_eq!(ranges[3].len, 28);
        assert_eq!(ranges[3].offset, 75);
    }

    #[test]
    fn test_tiny_file_lands_in_last_range() {
        let ranges = TransferDescriptor::for_stream("f", 3).ranges();
        assert_eq!(ranges.iter().map(|r| r.len).collect::<Vec<_>>(), vec![0, 0, 0, 3]);
    }

    #[test]
    fn test_chunks_cover_file() {
        for total in [0u64, 1, 8191, 8192, 8193, 3 * 8192, 100_000] {
            let desc = TransferDescriptor::for_datagram("f", total, 8192);
            let chunks: Vec<_> = desc.chunks().collect();
            assert_eq!(chunks.len() as u64, desc.part_count);

            let mut expected_offset = 0;
            for chunk in &chunks {
                assert_eq!(chunk.offset, expected_offset);
                assert_eq!(chunk.sequence, sequence_for(chunk.offset, 8192));
                assert!(chunk.len <= 8192 && chunk.len > 0);
                expected_offset = chunk.end();
            }
            assert_eq!(expected_offset, total);
        }
    }

    #[test]
    fn test_ten_mib_is_1280_chunks() {
        let desc = TransferDescriptor::for_datagram("video.mp4", 10 * 1024 * 1024, 8192);
        assert_eq!(desc.part_count, 1280);
        assert_eq!(desc.remainder, 0);
        assert_eq!(desc.chunks().len(), 1280);
        assert_eq!(desc.chunks().last().unwrap().sequence, 1279);
    }
}
