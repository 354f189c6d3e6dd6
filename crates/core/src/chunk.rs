//! Chunk boundary computation.
//!
//! Turns `(artifact size, chunk size)` into a lazy sequence of byte ranges.
//! Nothing here reads artifact bytes: a [`ChunkSpec`] only describes where a
//! chunk lives, so callers can re-derive the exact same ranges on a retried
//! attempt without materializing anything.

use serde::{Deserialize, Serialize};

/// One chunk's byte range within the source artifact.
///
/// Ranges are contiguous and gap-free, `offset + length` never exceeds the
/// artifact size, and only the final chunk may be shorter than the plan's
/// chunk size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Zero-based position within the artifact.
    pub index: u32,
    /// Byte offset of the first byte of this chunk.
    pub offset: u64,
    /// Number of bytes in this chunk.
    pub length: u64,
}

impl ChunkSpec {
    /// Exclusive end offset of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Number of chunks an artifact of `total_len` bytes splits into.
///
/// Rounds up, and floors at 1 so an empty artifact still produces a single
/// empty chunk. Callers must guarantee `chunk_size > 0`.
pub fn chunk_count(total_len: u64, chunk_size: u64) -> u32 {
    total_len.div_ceil(chunk_size).max(1) as u32
}

/// Split an artifact of `total_len` bytes into `chunk_size`-byte ranges.
///
/// The returned iterator is cheap to clone, and splitting again with the same
/// arguments yields identical ranges, so a failed transfer can restart from
/// any chunk without bookkeeping.
pub fn split(total_len: u64, chunk_size: u64) -> crate::Result<ChunkSpecs> {
    if chunk_size == 0 {
        return Err(crate::Error::InvalidChunkSize(chunk_size));
    }

    Ok(ChunkSpecs {
        total_len,
        chunk_size,
        next_index: 0,
        count: chunk_count(total_len, chunk_size),
    })
}

/// Lazy iterator over the chunk ranges of one artifact.
#[derive(Clone, Debug)]
pub struct ChunkSpecs {
    total_len: u64,
    chunk_size: u64,
    next_index: u32,
    count: u32,
}

impl ChunkSpecs {
    /// Total number of chunks this iterator yields from the start.
    pub fn total(&self) -> u32 {
        self.count
    }
}

impl Iterator for ChunkSpecs {
    type Item = ChunkSpec;

    fn next(&mut self) -> Option<ChunkSpec> {
        if self.next_index >= self.count {
            return None;
        }

        let index = self.next_index;
        let offset = u64::from(index) * self.chunk_size;
        let length = self.chunk_size.min(self.total_len.saturating_sub(offset));
        self.next_index += 1;

        Some(ChunkSpec {
            index,
            offset,
            length,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkSpecs {}
