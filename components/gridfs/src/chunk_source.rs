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

use grist_common::{chunk_extent, ChunkIndex, ChunkSize, FileOffset};
use grist_store::Backend;
use grist_types::{field, ChunkRecord, Filter, Value};
use snafu::ensure;

use crate::err::{InconsistentSnafu, Result};

/// Everything a chunk read or write needs to know about the file it serves,
/// borrowed from the owning handle for the span of one call.
pub(crate) struct ChunkSource<'a> {
    pub(crate) backend:    &'a dyn Backend,
    pub(crate) collection: &'a str,
    pub(crate) files_id:   &'a Value,
    pub(crate) chunk_size: ChunkSize,
    pub(crate) length:     FileOffset,
    pub(crate) batch_size: u32,
}

impl<'a> ChunkSource<'a> {
    pub(crate) fn chunk_filter(&self, n: ChunkIndex) -> Filter {
        Filter::all()
            .eq(field::FILES_ID, self.files_id.clone())
            .eq(field::N, n as i64)
    }

    pub(crate) fn tail_filter(&self, from: ChunkIndex) -> Filter {
        Filter::all()
            .eq(field::FILES_ID, self.files_id.clone())
            .gte(field::N, from as i64)
    }

    /// How many bytes chunk `n` holds under the current length.
    pub(crate) fn expected_len(&self, n: ChunkIndex) -> u64 {
        chunk_extent(n, self.chunk_size, self.length).map_or(0, |(start, end)| end - start)
    }

    /// Fails unless `chunk` is chunk `n` and carries exactly the bytes the
    /// recorded length implies.
    pub(crate) fn check(&self, n: ChunkIndex, chunk: &ChunkRecord) -> Result<()> {
        ensure!(
            chunk.n == n,
            InconsistentSnafu {
                files_id: self.files_id.to_string(),
                reason:   format!("expected chunk {} but the store returned chunk {}", n, chunk.n),
            }
        );
        let expected = self.expected_len(n);
        ensure!(
            chunk.len() as u64 == expected,
            InconsistentSnafu {
                files_id: self.files_id.to_string(),
                reason:   format!("chunk {} holds {} bytes, expected {}", n, chunk.len(), expected),
            }
        );
        Ok(())
    }

    pub(crate) fn missing(&self, n: ChunkIndex) -> crate::Error {
        InconsistentSnafu {
            files_id: self.files_id.to_string(),
            reason:   format!("chunk {} is missing", n),
        }
        .build()
    }
}
