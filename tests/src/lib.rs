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

//! End to end scenarios for chunked files over the in-memory store.

use std::sync::Arc;

use grist_gridfs::{Config, GridFs};
use grist_store::MemoryBackend;

#[cfg(test)]
mod scenarios;

/// Opens a [GridFs] named `name` on a fresh in-memory store, dropping
/// anything a previous run left in its collections.
pub fn gridfs_for_test(name: &str) -> (MemoryBackend, GridFs) {
    grist_utils::logger::install_fmt_log();
    let store = MemoryBackend::new(name);
    let mut config = Config::default();
    config.with_prefix(name);
    let fs = match GridFs::new(Arc::new(store.clone()), config) {
        Ok(fs) => fs,
        Err(e) => panic!("failed to open gridfs {name}: {e}"),
    };
    (store, fs)
}

/// Deterministic text of `len` bytes, the same phrase over and over.
pub fn sample_text(len: usize) -> Vec<u8> {
    const PHRASE: &[u8] = b"Bacon ipsum dolor sit amet turducken spare ribs brisket. ";
    PHRASE.iter().copied().cycle().take(len).collect()
}
