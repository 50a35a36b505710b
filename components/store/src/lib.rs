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

pub mod backend;
pub mod config;
pub mod err;

pub use backend::{
    memory::{BackendStats, MemoryBackend},
    open_backend, Backend, BackendRef, Cursor, CursorRef, DocumentCursor, UpdateOutcome,
};
pub use config::StoreConfig;
pub use err::{Error, Result};

/// Opens the backend described by `config`.
pub fn open(config: &StoreConfig) -> Result<BackendRef> {
    backend::open_backend_with(&config.dsn, config.default_batch_size)
}
