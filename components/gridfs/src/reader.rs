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

use std::collections::VecDeque;

use grist_common::{ChunkIndex, CursorId};
use grist_store::CursorRef;
use grist_types::{field, ChunkRecord, FindOptions, Projection, Sort};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    chunk_source::ChunkSource,
    err::{InconsistentSnafu, ModelSnafu, Result, StoreSnafu},
};

enum CursorState {
    NoCursor,
    /// A live range query. `next` is the chunk it hands out next and
    /// `fetched_end` is one past the last chunk received so far.
    Buffered {
        cursor:      CursorRef,
        batch:       VecDeque<ChunkRecord>,
        next:        ChunkIndex,
        fetched_end: ChunkIndex,
    },
    /// The range query has handed out everything it matched.
    Exhausted,
}

/// [ChunkReader] keeps the chunk last read resident and walks an open range
/// query forward, so sequential reads cost one round trip per batch rather
/// than one per chunk.
///
/// A requested chunk is served from the resident page, or by continuing the
/// open query when it lies between the query's next chunk and the end of what
/// it has fetched plus one more batch. Anything else, backwards seeks and far
/// forward jumps, abandons the query and starts a new one at the target.
pub(crate) struct ChunkReader {
    state: CursorState,
    page:  Option<ChunkRecord>,
}

impl ChunkReader {
    pub(crate) fn new() -> Self {
        ChunkReader {
            state: CursorState::NoCursor,
            page:  None,
        }
    }

    /// Returns chunk `n`, checked against the file's recorded length.
    pub(crate) fn page(&mut self, src: &ChunkSource<'_>, n: ChunkIndex) -> Result<&ChunkRecord> {
        if !matches!(&self.page, Some(p) if p.n == n) {
            self.page = None;
            if !self.can_advance_to(n) {
                self.reissue(src, n)?;
            }
            let chunk = self.advance_to(src, n)?;
            src.check(n, &chunk)?;
            self.page = Some(chunk);
        }
        match &self.page {
            Some(page) => Ok(page),
            None => Err(src.missing(n)),
        }
    }

    fn can_advance_to(&self, n: ChunkIndex) -> bool {
        match &self.state {
            CursorState::Buffered {
                next, fetched_end, ..
            } => *next <= n && n <= *fetched_end,
            _ => false,
        }
    }

    fn reissue(&mut self, src: &ChunkSource<'_>, from: ChunkIndex) -> Result<()> {
        self.release_cursor();
        let options = FindOptions::default()
            .with_sort(Sort::ascending(field::N))
            .with_projection(Projection::include([field::N, field::DATA]).without_id())
            .with_batch_size(src.batch_size);
        let cursor = src
            .backend
            .query(src.collection, &src.tail_filter(from), &options)
            .context(StoreSnafu)?;
        debug!(
            "range read of {} from chunk {} on cursor {}",
            src.files_id,
            from,
            cursor.id()
        );
        self.state = CursorState::Buffered {
            cursor,
            batch: VecDeque::new(),
            next: from,
            fetched_end: from,
        };
        Ok(())
    }

    fn advance_to(&mut self, src: &ChunkSource<'_>, n: ChunkIndex) -> Result<ChunkRecord> {
        loop {
            let CursorState::Buffered {
                cursor,
                batch,
                next,
                fetched_end,
            } = &mut self.state
            else {
                return Err(src.missing(n));
            };

            let Some(chunk) = batch.pop_front() else {
                match cursor.next_batch().context(StoreSnafu)? {
                    Some(docs) => {
                        for doc in &docs {
                            batch.push_back(ChunkRecord::from_document(doc).context(ModelSnafu)?);
                        }
                        if let Some(last) = batch.back() {
                            *fetched_end = (*fetched_end).max(last.n + 1);
                        }
                        continue;
                    }
                    None => {
                        self.state = CursorState::Exhausted;
                        return Err(src.missing(n));
                    }
                }
            };

            if chunk.n != *next {
                let err = InconsistentSnafu {
                    files_id: src.files_id.to_string(),
                    reason:   format!("expected chunk {} but the store returned chunk {}", next, chunk.n),
                }
                .build();
                self.release_cursor();
                return Err(err);
            }
            *next += 1;
            if chunk.n == n {
                if batch.is_empty() && !cursor.is_alive() {
                    // drained, and the store already freed the cursor.
                    self.state = CursorState::Exhausted;
                }
                return Ok(chunk);
            }
        }
    }

    /// Drops the resident page and abandons any open query.
    pub(crate) fn invalidate(&mut self) {
        self.release_cursor();
        self.page = None;
    }

    fn release_cursor(&mut self) {
        if let CursorState::Buffered { mut cursor, .. } =
            std::mem::replace(&mut self.state, CursorState::NoCursor)
        {
            cursor.kill();
        }
    }

    pub(crate) fn cursor_id(&self) -> Option<CursorId> {
        match &self.state {
            CursorState::Buffered { cursor, .. } => Some(cursor.id()),
            _ => None,
        }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) { self.release_cursor(); }
}
