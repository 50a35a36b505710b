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

use grist_common::{cal_chunk_idx, cal_chunk_offset, ChunkIndex, FileOffset};
use grist_types::{field, ChunkRecord, FindOptions, Projection};
use grist_store::DocumentCursor;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    chunk_source::ChunkSource,
    err::{ModelSnafu, Result, StoreSnafu},
};

/// The one chunk being modified. `data` always holds the chunk's complete
/// content under the file's current length.
#[derive(Debug)]
struct DirtyChunk {
    n:    ChunkIndex,
    data: Vec<u8>,
}

/// [ChunkWriter] merges writes into whole chunks. A write that covers a
/// chunk's existing bytes from its start replaces it outright; any other
/// write first fetches the stored chunk and merges into it. The merged chunk
/// stays pending until the handle moves to another chunk, reads, or saves.
#[derive(Debug, Default)]
pub(crate) struct ChunkWriter {
    pending: Option<DirtyChunk>,
}

impl ChunkWriter {
    pub(crate) fn new() -> Self { Self::default() }

    pub(crate) fn has_pending(&self) -> bool { self.pending.is_some() }

    /// Writes `data` at `pos`. The caller splits writes on chunk boundaries.
    pub(crate) fn write_at(&mut self, src: &ChunkSource<'_>, pos: FileOffset, data: &[u8]) -> Result<()> {
        let n = cal_chunk_idx(pos, src.chunk_size);
        let off = cal_chunk_offset(pos, src.chunk_size) as usize;
        debug_assert!(off + data.len() <= src.chunk_size as usize);

        let chunk = self.load(src, n, off, data.len())?;
        let end = off + data.len();
        if chunk.data.len() < end {
            // a write past the end of the chunk, or after a gap, pads with zeros.
            chunk.data.resize(end, 0);
        }
        chunk.data[off..end].copy_from_slice(data);
        Ok(())
    }

    /// Makes chunk `n` the pending one, flushing whatever was pending before.
    fn load(&mut self, src: &ChunkSource<'_>, n: ChunkIndex, off: usize, len: usize) -> Result<&mut DirtyChunk> {
        if self.pending.as_ref().is_some_and(|c| c.n != n) {
            self.flush(src)?;
        }
        if self.pending.is_none() {
            let existing = src.expected_len(n) as usize;
            let data = if existing == 0 || (off == 0 && len >= existing) {
                Vec::with_capacity(src.chunk_size as usize)
            } else {
                fetch_chunk(src, n)?
            };
            self.pending = Some(DirtyChunk { n, data });
        }
        match self.pending.as_mut() {
            Some(chunk) => Ok(chunk),
            None => Err(src.missing(n)),
        }
    }

    /// Stores the pending chunk. Returns whether there was one. On failure
    /// the chunk stays pending.
    pub(crate) fn flush(&mut self, src: &ChunkSource<'_>) -> Result<bool> {
        let Some(chunk) = &self.pending else {
            return Ok(false);
        };
        let record = ChunkRecord::new(src.files_id.clone(), chunk.n, chunk.data.clone());
        src.backend
            .update_or_replace(src.collection, &src.chunk_filter(chunk.n), record.to_document(), true)
            .context(StoreSnafu)?;
        debug!("flushed chunk {} of {} with {} bytes", chunk.n, src.files_id, chunk.data.len());
        self.pending = None;
        Ok(true)
    }

    /// Forgets the pending chunk without storing it.
    pub(crate) fn discard(&mut self) { self.pending = None; }
}

/// Fetch-before-merge: reads the stored copy of chunk `n` so a partial write
/// keeps the bytes around it.
fn fetch_chunk(src: &ChunkSource<'_>, n: ChunkIndex) -> Result<Vec<u8>> {
    let options = FindOptions::default()
        .with_projection(Projection::include([field::N, field::DATA]).without_id())
        .with_limit(1);
    let cursor = src
        .backend
        .query(src.collection, &src.chunk_filter(n), &options)
        .context(StoreSnafu)?;
    let doc = DocumentCursor::new(cursor)
        .next()
        .context(StoreSnafu)?
        .ok_or_else(|| src.missing(n))?;
    let chunk = ChunkRecord::from_document(&doc).context(ModelSnafu)?;
    src.check(n, &chunk)?;
    debug!("fetched chunk {} of {} to merge into", n, src.files_id);
    Ok(chunk.data.to_vec())
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;

    use crate::{
        gridfs::tests::{memory_fs, stored_chunk_sizes},
        FileOptions,
    };

    #[test]
    fn overwrite_in_the_middle() {
        let (store, fs) = memory_fs(0);
        let mut file = fs
            .create_file(FileOptions::default().with_filename("foo").with_chunk_size(2))
            .unwrap();
        file.write(b"foo bar baz").unwrap();
        file.save().unwrap();

        file.seek(SeekFrom::Start(2)).unwrap();
        assert_eq!(file.write(b" baz").unwrap(), 4);
        assert_eq!(file.tell(), 6);
        assert_eq!(file.length(), 11);
        file.save().unwrap();
        assert_eq!(stored_chunk_sizes(&store, file.id()), vec![2, 2, 2, 2, 2, 1]);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 11];
        assert_eq!(file.read(&mut buf).unwrap(), 11);
        assert_eq!(&buf, b"fo bazr baz");
    }

    #[test]
    fn covering_write_skips_the_fetch() {
        let (store, fs) = memory_fs(0);
        let mut file = fs.create_file(FileOptions::default().with_chunk_size(4)).unwrap();
        file.write(b"aaaabbbbcccc").unwrap();
        file.save().unwrap();

        let queries = store.stats().queries;
        file.seek(SeekFrom::Start(4)).unwrap();
        file.write(b"BBBB").unwrap();
        file.save().unwrap();
        assert_eq!(store.stats().queries, queries);

        // a partial overwrite has to read the chunk first.
        file.seek(SeekFrom::Start(9)).unwrap();
        file.write(b"C").unwrap();
        file.save().unwrap();
        assert_eq!(store.stats().queries, queries + 1);
        assert_eq!(stored_chunk_sizes(&store, file.id()), vec![4, 4, 4]);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 12];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"aaaaBBBBcCcc");
    }

    #[test]
    fn writes_stay_pending_within_a_chunk() {
        let (store, fs) = memory_fs(0);
        let mut file = fs.create_file(FileOptions::default().with_chunk_size(8)).unwrap();
        let updates = store.stats().updates;
        for b in b"abcdef" {
            file.write(&[*b]).unwrap();
        }
        assert_eq!(store.stats().updates, updates);

        // crossing into chunk 1 stores chunk 0.
        file.write(b"ghij").unwrap();
        assert_eq!(store.stats().updates, updates + 1);
        file.save().unwrap();
        assert_eq!(store.stats().updates, updates + 3);
    }

    #[test]
    fn sparse_write_fills_the_gap() {
        let (store, fs) = memory_fs(0);
        let mut file = fs.create_file(FileOptions::default().with_chunk_size(4)).unwrap();
        file.write(b"ab").unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write(b"xy").unwrap();
        assert_eq!(file.length(), 12);
        file.save().unwrap();
        assert_eq!(stored_chunk_sizes(&store, file.id()), vec![4, 4, 4]);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0xffu8; 12];
        assert_eq!(file.read(&mut buf).unwrap(), 12);
        assert_eq!(&buf, b"ab\0\0\0\0\0\0\0\0xy");
    }

    #[test]
    fn read_sees_unsaved_writes() {
        let (_store, fs) = memory_fs(0);
        let mut file = fs.create_file(FileOptions::default().with_chunk_size(4)).unwrap();
        file.write(b"hello").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }
}
