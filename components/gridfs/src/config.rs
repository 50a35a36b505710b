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

use grist_common::{CHUNKS_SUFFIX, DEFAULT_CHUNK_SIZE, DEFAULT_PREFIX, DEFAULT_READ_BATCH_SIZE, FILES_SUFFIX};
use grist_utils::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Files live in `<prefix>.files`, their content in `<prefix>.chunks`.
    pub prefix:          String,
    /// Chunk size of new files that don't ask for one.
    pub chunk_size:      ReadableSize,
    /// How many chunks a range read asks for per round trip.
    pub read_batch_size: u32,
    /// Records per round trip when listing files, 0 leaves it to the store.
    pub list_batch_size: u32,
}

impl Config {
    pub fn with_prefix(&mut self, prefix: &str) -> &mut Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn with_chunk_size(&mut self, chunk_size: ReadableSize) -> &mut Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_read_batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.read_batch_size = batch_size;
        self
    }

    pub fn with_list_batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.list_batch_size = batch_size;
        self
    }

    pub fn files_collection(&self) -> String { format!("{}.{}", self.prefix, FILES_SUFFIX) }

    pub fn chunks_collection(&self) -> String { format!("{}.{}", self.prefix, CHUNKS_SUFFIX) }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix:          DEFAULT_PREFIX.to_string(),
            chunk_size:      ReadableSize(DEFAULT_CHUNK_SIZE), // 255KiB
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            list_batch_size: 0,
        }
    }
}
