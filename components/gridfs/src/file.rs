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

use std::{
    fmt::{Debug, Formatter},
    io::{IoSlice, IoSliceMut, SeekFrom},
    time::SystemTime,
};

use grist_common::{cal_chunk_idx, cal_chunk_offset, chunk_count, CursorId, FileOffset};
use grist_types::{field, Document, FileMetadata, Filter, Value};
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, error, instrument};

use crate::{
    chunk_source::ChunkSource,
    err::{InvalidArgumentSnafu, Result, StoreSnafu},
    gridfs::{Namespace, NamespaceRef},
    reader::ChunkReader,
    writer::ChunkWriter,
};

/// [GridFile] is an open handle on one stored file. It tracks a position and
/// reads and writes at it the way a regular file does.
///
/// Handles are independent of each other, even over the same file. Dropping
/// a handle stores pending writes and changed properties if the file was
/// written to or saved before; a created file that was never touched leaves
/// nothing behind.
pub struct GridFile {
    ns:      NamespaceRef,
    meta:    FileMetadata,
    pos:     FileOffset,
    reader:  ChunkReader,
    writer:  ChunkWriter,
    /// The files record exists in the store.
    saved:   bool,
    /// `meta` differs from what is stored.
    dirty:   bool,
    written: bool,
    removed: bool,
}

fn chunk_source<'a>(ns: &'a Namespace, meta: &'a FileMetadata) -> ChunkSource<'a> {
    ChunkSource {
        backend:    ns.backend.as_ref(),
        collection: &ns.chunks,
        files_id:   &meta.id,
        chunk_size: meta.chunk_size,
        length:     meta.length,
        batch_size: ns.config.read_batch_size,
    }
}

impl GridFile {
    pub(crate) fn created(ns: NamespaceRef, meta: FileMetadata) -> Self { Self::new(ns, meta, false) }

    pub(crate) fn opened(ns: NamespaceRef, meta: FileMetadata) -> Self { Self::new(ns, meta, true) }

    fn new(ns: NamespaceRef, meta: FileMetadata, saved: bool) -> Self {
        GridFile {
            ns,
            meta,
            pos: 0,
            reader: ChunkReader::new(),
            writer: ChunkWriter::new(),
            saved,
            dirty: !saved,
            written: false,
            removed: false,
        }
    }

    pub fn id(&self) -> &Value { &self.meta.id }

    pub fn filename(&self) -> Option<&str> { self.meta.filename.as_deref() }

    pub fn content_type(&self) -> Option<&str> { self.meta.content_type.as_deref() }

    pub fn aliases(&self) -> &[String] { &self.meta.aliases }

    pub fn metadata(&self) -> Option<&Document> { self.meta.metadata.as_ref() }

    pub fn md5(&self) -> Option<&str> { self.meta.md5.as_deref() }

    pub fn chunk_size(&self) -> u64 { self.meta.chunk_size }

    pub fn length(&self) -> u64 { self.meta.length }

    pub fn upload_date(&self) -> SystemTime { self.meta.upload_time() }

    /// The descriptor as it would be stored by the next save.
    pub fn record(&self) -> &FileMetadata { &self.meta }

    pub fn set_filename(&mut self, filename: Option<&str>) {
        self.meta.filename = filename.map(str::to_string);
        self.dirty = true;
    }

    pub fn set_content_type(&mut self, content_type: Option<&str>) {
        self.meta.content_type = content_type.map(str::to_string);
        self.dirty = true;
    }

    pub fn set_aliases(&mut self, aliases: Vec<String>) {
        self.meta.aliases = aliases;
        self.dirty = true;
    }

    pub fn set_metadata(&mut self, metadata: Option<Document>) {
        self.meta.metadata = metadata;
        self.dirty = true;
    }

    pub fn set_md5(&mut self, md5: Option<&str>) {
        self.meta.md5 = md5.map(str::to_string);
        self.dirty = true;
    }

    /// Whether the files record has been stored, by this handle or before it.
    pub fn is_saved(&self) -> bool { self.saved }

    pub fn tell(&self) -> FileOffset { self.pos }

    /// Moves the position. Landing past the end is fine, reads there return
    /// nothing and writes there zero fill the gap. A negative result fails
    /// and leaves the position alone.
    ///
    /// The gap is filled synchronously one chunk at a time, so a write far
    /// beyond the end costs a round trip per skipped chunk.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<FileOffset> {
        let target = match pos {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::Current(off) => self.pos.checked_add_signed(off),
            SeekFrom::End(off) => self.meta.length.checked_add_signed(off),
        };
        let target = target.context(InvalidArgumentSnafu {
            reason: format!("seek {:?} from {} lands before the start of the file", pos, self.pos),
        })?;
        self.pos = target;
        Ok(target)
    }

    /// The id of the range query backing sequential reads, if one is open.
    pub fn cursor_id(&self) -> Option<CursorId> { self.reader.cursor_id() }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> { self.readv(&mut [IoSliceMut::new(buf)]) }

    /// Fills `bufs` in order from the current position. Fewer bytes than
    /// asked for come back only at the end of the file, and nothing at all
    /// once the position is at or past it.
    #[instrument(skip_all, fields(id = %self.meta.id, pos = self.pos))]
    pub fn readv(&mut self, bufs: &mut [IoSliceMut<'_>]) -> Result<usize> {
        self.ensure_live()?;
        let requested = bufs.iter().map(|b| b.len()).sum::<usize>();
        if requested == 0 {
            return Ok(0);
        }
        self.flush_chunks()?;
        if self.pos >= self.meta.length {
            return Ok(0);
        }

        let want = (self.meta.length - self.pos).min(requested as u64) as usize;
        let mut copied = 0;
        for buf in bufs.iter_mut() {
            let mut filled = 0;
            while filled < buf.len() && copied < want {
                let src = chunk_source(&self.ns, &self.meta);
                let n = cal_chunk_idx(self.pos, src.chunk_size);
                let off = cal_chunk_offset(self.pos, src.chunk_size) as usize;
                let page = self.reader.page(&src, n)?;
                let take = (page.len() - off).min(buf.len() - filled).min(want - copied);
                buf[filled..filled + take].copy_from_slice(&page.data[off..off + take]);
                filled += take;
                copied += take;
                self.pos += take as u64;
            }
            if copied == want {
                break;
            }
        }
        debug!("read {} of {} requested bytes", copied, requested);
        Ok(copied)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> { self.writev(&[IoSlice::new(buf)]) }

    /// Writes `bufs` in order at the current position, overwriting what is
    /// there and growing the file as needed. Writing past the end first zero
    /// fills the gap, see [GridFile::seek].
    ///
    /// A store failure part way through leaves the position and length
    /// covering the bytes accepted before it. Those bytes are kept, pending or
    /// stored, and the next save records the length they reach.
    #[instrument(skip_all, fields(id = %self.meta.id, pos = self.pos))]
    pub fn writev(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        self.ensure_live()?;
        let total = bufs.iter().map(|b| b.len()).sum::<usize>();
        if total == 0 {
            return Ok(0);
        }
        ensure!(
            self.pos.checked_add(total as u64).is_some(),
            InvalidArgumentSnafu {
                reason: format!("writing {} bytes at {} overflows the file offset", total, self.pos),
            }
        );
        self.reader.invalidate();
        self.written = true;
        self.dirty = true;

        if self.pos > self.meta.length {
            self.fill_gap()?;
        }
        for buf in bufs {
            self.write_all_at_pos(buf)?;
        }
        debug!("wrote {} bytes, length is now {}", total, self.meta.length);
        Ok(total)
    }

    /// Zero fills `[length, pos)` through the regular write path.
    fn fill_gap(&mut self) -> Result<()> {
        let end = self.pos;
        let zeros = vec![0u8; self.meta.chunk_size.min(end - self.meta.length) as usize];
        self.pos = self.meta.length;
        while self.pos < end {
            let len = (end - self.pos).min(zeros.len() as u64) as usize;
            self.write_all_at_pos(&zeros[..len])?;
        }
        Ok(())
    }

    fn write_all_at_pos(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let room = self.meta.chunk_size - cal_chunk_offset(self.pos, self.meta.chunk_size);
            let take = (room as usize).min(data.len());
            let src = chunk_source(&self.ns, &self.meta);
            self.writer.write_at(&src, self.pos, &data[..take])?;
            self.pos += take as u64;
            self.meta.length = self.meta.length.max(self.pos);
            data = &data[take..];
        }
        Ok(())
    }

    /// Stores the chunk that is still being written to, if any.
    pub fn flush_chunks(&mut self) -> Result<()> {
        self.ensure_live()?;
        let src = chunk_source(&self.ns, &self.meta);
        if self.writer.flush(&src)? {
            self.reader.invalidate();
        }
        Ok(())
    }

    /// Stores pending chunk data, then the files record if it changed.
    #[instrument(skip_all, fields(id = %self.meta.id))]
    pub fn save(&mut self) -> Result<()> {
        self.flush_chunks()?;
        if self.saved && !self.dirty {
            return Ok(());
        }
        let filter = Filter::all().eq(field::ID, self.meta.id.clone());
        self.ns
            .backend
            .update_or_replace(&self.ns.files, &filter, self.meta.to_document(), true)
            .context(StoreSnafu)?;
        debug!("saved {} with length {}", self.meta.id, self.meta.length);
        self.saved = true;
        self.dirty = false;
        Ok(())
    }

    /// Deletes the file's chunks and its files record. Afterwards the handle
    /// can only be dropped; reads, writes and saves fail.
    #[instrument(skip_all, fields(id = %self.meta.id))]
    pub fn remove(&mut self) -> Result<()> {
        self.reader.invalidate();
        self.writer.discard();
        remove_file(&self.ns, &self.meta.id)?;
        self.removed = true;
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        ensure!(
            !self.removed,
            InvalidArgumentSnafu {
                reason: format!("file {} has been removed", self.meta.id),
            }
        );
        Ok(())
    }

    /// How many chunk records the current length calls for.
    pub fn num_chunks(&self) -> u64 { chunk_count(self.meta.length, self.meta.chunk_size) }

    fn needs_save_on_drop(&self) -> bool {
        !self.removed && (self.writer.has_pending() || (self.dirty && (self.saved || self.written)))
    }
}

/// Deletes every chunk of `files_id`, then its files record.
pub(crate) fn remove_file(ns: &Namespace, files_id: &Value) -> Result<()> {
    let chunks = ns
        .backend
        .delete_many(&ns.chunks, &Filter::all().eq(field::FILES_ID, files_id.clone()))
        .context(StoreSnafu)?;
    ns.backend
        .delete_many(&ns.files, &Filter::all().eq(field::ID, files_id.clone()))
        .context(StoreSnafu)?;
    debug!("removed {} and its {} chunks", files_id, chunks);
    Ok(())
}

impl Drop for GridFile {
    fn drop(&mut self) {
        self.reader.invalidate();
        if self.needs_save_on_drop() {
            if let Err(e) = self.save() {
                error!("failed to save {} on drop: {}", self.meta.id, e);
            }
        }
    }
}

impl Debug for GridFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridFile")
            .field("id", &self.meta.id)
            .field("filename", &self.meta.filename)
            .field("length", &self.meta.length)
            .field("chunk_size", &self.meta.chunk_size)
            .field("pos", &self.pos)
            .field("saved", &self.saved)
            .finish()
    }
}
