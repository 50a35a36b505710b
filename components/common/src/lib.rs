// Copyright 2024 grist
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub const GRIST: &str = "grist";
pub const GRIST_DEBUG_STORE_ADDR: &str = "memory://:grist";

// The collection prefix used when the caller doesn't pick one.
pub const DEFAULT_PREFIX: &str = "fs";
pub const FILES_SUFFIX: &str = "files";
pub const CHUNKS_SUFFIX: &str = "chunks";

pub const CHUNKS_INDEX_NAME: &str = "files_id_1_n_1";
pub const FILENAME_INDEX_NAME: &str = "filename_1";

// 255 KiB keeps a chunk record plus its envelope under 256 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 255 << 10;
// Chunks are addressed by a 32-bit `n` on the wire.
pub const MAX_CHUNK_SIZE: u64 = 16 << 20; // 16 MiB

// How many chunk records one range query asks for per round trip.
pub const DEFAULT_READ_BATCH_SIZE: u32 = 16;
// What the backend hands out when the caller leaves the batch size at 0.
pub const DEFAULT_BACKEND_BATCH_SIZE: u32 = 101;

pub fn cal_chunk_idx(offset: FileOffset, chunk_size: ChunkSize) -> ChunkIndex { offset / chunk_size }

pub fn cal_chunk_offset(offset: FileOffset, chunk_size: ChunkSize) -> ChunkOffset {
    offset % chunk_size
}

/// The byte range `[start, end)` chunk `idx` covers in a file of `length`
/// bytes, or `None` when the chunk lies entirely past the end.
pub fn chunk_extent(idx: ChunkIndex, chunk_size: ChunkSize, length: FileOffset) -> Option<(FileOffset, FileOffset)> {
    let start = idx.checked_mul(chunk_size)?;
    if start >= length {
        return None;
    }
    Some((start, length.min(start.saturating_add(chunk_size))))
}

/// Number of chunk records a fully flushed file of `length` bytes owns.
pub fn chunk_count(length: FileOffset, chunk_size: ChunkSize) -> u64 {
    if length == 0 {
        0
    } else {
        (length - 1) / chunk_size + 1
    }
}

pub type ChunkIndex = u64;
pub type ChunkOffset = u64;
pub type ChunkSize = u64;
pub type FileOffset = u64;

pub type CursorId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_arithmetic() {
        assert_eq!(cal_chunk_idx(0, 4), 0);
        assert_eq!(cal_chunk_idx(3, 4), 0);
        assert_eq!(cal_chunk_idx(4, 4), 1);
        assert_eq!(cal_chunk_offset(9, 4), 1);

        let big = u64::MAX - 1;
        assert_eq!(cal_chunk_idx(big, DEFAULT_CHUNK_SIZE), big / DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn extents() {
        assert_eq!(chunk_extent(0, 2, 11), Some((0, 2)));
        assert_eq!(chunk_extent(5, 2, 11), Some((10, 11)));
        assert_eq!(chunk_extent(6, 2, 11), None);
        assert_eq!(chunk_extent(0, 2, 0), None);
        assert_eq!(chunk_extent(u64::MAX, 2, u64::MAX), None);

        assert_eq!(chunk_count(0, 2), 0);
        assert_eq!(chunk_count(1, 2), 1);
        assert_eq!(chunk_count(2, 2), 1);
        assert_eq!(chunk_count(11, 2), 6);
    }
}
