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

use std::{collections::VecDeque, str::FromStr, sync::Arc};

use grist_common::CursorId;
use grist_types::{Document, Filter, FindOptions, IndexModel, Value};
use snafu::{ensure, OptionExt};
use strum_macros::EnumString;
use tracing::debug;

use crate::err::{Result, UnsupportedStoreDSNSnafu};

pub mod memory;

pub fn open_backend(dsn: &str) -> Result<BackendRef> {
    open_backend_with(dsn, grist_common::DEFAULT_BACKEND_BATCH_SIZE)
}

pub(crate) fn open_backend_with(dsn: &str, default_batch_size: u32) -> Result<BackendRef> {
    let x = dsn.splitn(2, "://:").collect::<Vec<_>>();
    ensure!(x.len() == 2, UnsupportedStoreDSNSnafu { dsn });
    let backend_kind = x[0];
    let address = x[1];

    let backend = BackendKinds::from_str(backend_kind)
        .ok()
        .context(UnsupportedStoreDSNSnafu { dsn })?;
    backend.build(address, default_batch_size)
}

#[derive(Debug, EnumString)]
enum BackendKinds {
    #[strum(serialize = "memory", serialize = "Memory")]
    Memory,
}

impl BackendKinds {
    fn build(&self, address: &str, default_batch_size: u32) -> Result<BackendRef> {
        match self {
            BackendKinds::Memory => {
                let mut builder = memory::Builder::default();
                builder.with_name(address).with_default_batch_size(default_batch_size);
                debug!("backend [memory] is built with name: {}", address);
                builder.build()
            }
        }
    }
}

pub type BackendRef = Arc<dyn Backend>;
pub type CursorRef = Box<dyn Cursor>;

/// What an [Backend::update_or_replace] call did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub matched:     u64,
    /// Set when nothing matched and the record was inserted instead.
    pub upserted_id: Option<Value>,
}

/// [Backend] is the document store the chunked files live in. Every call is
/// a single blocking round trip; retries are the implementation's business.
pub trait Backend: Send + Sync + 'static {
    /// Inserts one record and returns its `_id`, assigning one if absent.
    fn insert_one(&self, collection: &str, doc: Document) -> Result<Value>;

    /// Deletes every record matching `filter`, returns how many went away.
    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Replaces the first record matching `filter` with `doc`. With `upsert`
    /// a miss inserts `doc`, seeded with the filter's equality fields.
    fn update_or_replace(
        &self,
        collection: &str,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Runs a query and returns a server side cursor over its results.
    fn query(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<CursorRef>;

    fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64>;

    /// Creates `index` unless an index with the same name already exists.
    fn ensure_index(&self, collection: &str, index: &IndexModel) -> Result<()>;

    /// Drops a collection with its records and indexes. Dropping a missing
    /// collection succeeds.
    fn drop_collection(&self, collection: &str) -> Result<()>;
}

/// A handle on server side query results, delivered in batches.
pub trait Cursor: Send {
    fn id(&self) -> CursorId;

    /// Fetches the next batch. `None` once the results are exhausted, after
    /// which the server side state is already released.
    fn next_batch(&mut self) -> Result<Option<Vec<Document>>>;

    /// Whether more results may still come.
    fn is_alive(&self) -> bool;

    /// Releases the server side state. Safe to call more than once.
    fn kill(&mut self);
}

/// Hands out a [Cursor]'s results one record at a time.
pub struct DocumentCursor {
    cursor:   CursorRef,
    buffered: VecDeque<Document>,
}

impl DocumentCursor {
    pub fn new(cursor: CursorRef) -> Self {
        DocumentCursor {
            cursor,
            buffered: VecDeque::new(),
        }
    }

    pub fn id(&self) -> CursorId { self.cursor.id() }

    pub fn next(&mut self) -> Result<Option<Document>> {
        while self.buffered.is_empty() {
            match self.cursor.next_batch()? {
                Some(batch) => self.buffered.extend(batch),
                None => return Ok(None),
            }
        }
        Ok(self.buffered.pop_front())
    }

    pub fn is_alive(&self) -> bool { !self.buffered.is_empty() || self.cursor.is_alive() }

    pub fn kill(&mut self) {
        self.buffered.clear();
        self.cursor.kill();
    }
}
