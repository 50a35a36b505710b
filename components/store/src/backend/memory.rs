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
    collections::VecDeque,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use grist_common::{CursorId, DEFAULT_BACKEND_BATCH_SIZE};
use grist_types::{field, Document, Filter, FindOptions, IndexModel, ObjectId, Value};
use snafu::{ensure, OptionExt};
use tracing::debug;

use super::{Backend, BackendRef, Cursor, CursorRef, UpdateOutcome};
use crate::err::{CursorNotFoundSnafu, DuplicateKeySnafu, InvalidIndexSnafu, Result};

const ID_INDEX_NAME: &str = "_id_";

#[derive(Debug, Default)]
pub struct Builder {
    name:               String,
    default_batch_size: u32,
}

impl Builder {
    pub fn with_name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    pub fn with_default_batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.default_batch_size = batch_size;
        self
    }

    pub fn build(self) -> Result<BackendRef> {
        let batch_size = match self.default_batch_size {
            0 => DEFAULT_BACKEND_BATCH_SIZE,
            n => n,
        };
        Ok(Arc::new(MemoryBackend::with_default_batch_size(
            &self.name, batch_size,
        )))
    }
}

/// Round trips a [MemoryBackend] has served, for asserting on access
/// patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub queries:        u64,
    pub get_mores:      u64,
    pub killed_cursors: u64,
    pub open_cursors:   u64,
    pub inserts:        u64,
    pub updates:        u64,
    pub deletes:        u64,
}

/// An in-process [Backend]. It keeps records in insertion order, evaluates
/// filters by scanning, and keeps server side cursors with their unsent
/// results the way a remote store does, so batching is observable.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    name:               String,
    default_batch_size: u32,
    collections:        DashMap<String, Collection>,
    cursors:            DashMap<CursorId, ServerCursor>,
    next_cursor_id:     AtomicU64,
    counters:           Counters,
}

#[derive(Default)]
struct Counters {
    queries:        AtomicU64,
    get_mores:      AtomicU64,
    killed_cursors: AtomicU64,
    inserts:        AtomicU64,
    updates:        AtomicU64,
    deletes:        AtomicU64,
}

#[derive(Default)]
struct Collection {
    docs:    Vec<Document>,
    indexes: Vec<IndexModel>,
}

struct ServerCursor {
    collection: String,
    batch_size: usize,
    remaining:  VecDeque<Document>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self { Self::with_default_batch_size(name, DEFAULT_BACKEND_BATCH_SIZE) }

    pub fn with_default_batch_size(name: &str, batch_size: u32) -> Self {
        MemoryBackend {
            inner: Arc::new(Inner {
                name:               name.to_string(),
                default_batch_size: batch_size.max(1),
                collections:        DashMap::new(),
                cursors:            DashMap::new(),
                next_cursor_id:     AtomicU64::new(1),
                counters:           Counters::default(),
            }),
        }
    }

    pub fn stats(&self) -> BackendStats {
        let c = &self.inner.counters;
        BackendStats {
            queries:        c.queries.load(Ordering::Acquire),
            get_mores:      c.get_mores.load(Ordering::Acquire),
            killed_cursors: c.killed_cursors.load(Ordering::Acquire),
            open_cursors:   self.inner.cursors.len() as u64,
            inserts:        c.inserts.load(Ordering::Acquire),
            updates:        c.updates.load(Ordering::Acquire),
            deletes:        c.deletes.load(Ordering::Acquire),
        }
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names = self.inner.collections.iter().map(|e| e.key().clone()).collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.inner
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("MemoryBackend");
        ds.field("name", &self.inner.name);
        ds.field("collections", &self.inner.collections.len());
        ds.field("cursors", &self.inner.cursors.len());
        ds.finish()
    }
}

fn render_key(key: &[Value]) -> String {
    let parts = key.iter().map(|v| v.to_string()).collect::<Vec<_>>();
    format!("({})", parts.join(", "))
}

impl Collection {
    // `skip` is the position of the record being replaced, if any.
    fn check_unique(&self, collection: &str, doc: &Document, skip: Option<usize>) -> Result<()> {
        let others = || {
            self.docs
                .iter()
                .enumerate()
                .filter(move |(i, _)| Some(*i) != skip)
                .map(|(_, d)| d)
        };

        if let Some(id) = doc.get(field::ID) {
            ensure!(
                !others().any(|d| d.get(field::ID) == Some(id)),
                DuplicateKeySnafu {
                    collection,
                    index: ID_INDEX_NAME,
                    key: id.to_string(),
                }
            );
        }
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index.key_of(doc);
            ensure!(
                !others().any(|d| index.key_of(d) == key),
                DuplicateKeySnafu {
                    collection,
                    index: index.name.clone(),
                    key: render_key(&key),
                }
            );
        }
        Ok(())
    }
}

impl Inner {
    fn next_cursor_id(&self) -> CursorId { self.next_cursor_id.fetch_add(1, Ordering::AcqRel) }

    fn get_more(&self, id: CursorId) -> Result<(Vec<Document>, bool)> {
        self.counters.get_mores.fetch_add(1, Ordering::AcqRel);
        let result = {
            let mut cursor = self.cursors.get_mut(&id).context(CursorNotFoundSnafu { id })?;
            let n = cursor.batch_size.min(cursor.remaining.len());
            let batch = cursor.remaining.drain(..n).collect::<Vec<_>>();
            let exhausted = cursor.remaining.is_empty();
            debug!(
                "get more on cursor {} over {}: {} records, exhausted: {}",
                id, cursor.collection, n, exhausted
            );
            (batch, exhausted)
        };
        if result.1 {
            self.cursors.remove(&id);
        }
        Ok(result)
    }

    fn kill_cursor(&self, id: CursorId) {
        if self.cursors.remove(&id).is_some() {
            self.counters.killed_cursors.fetch_add(1, Ordering::AcqRel);
            debug!("cursor {} killed", id);
        }
    }
}

impl Backend for MemoryBackend {
    fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Value> {
        let id = match doc.get(field::ID) {
            Some(id) => id.clone(),
            None => {
                let id = Value::from(ObjectId::new());
                doc.insert(field::ID, id.clone());
                id
            }
        };
        let mut coll = self.inner.collections.entry(collection.to_string()).or_default();
        coll.check_unique(collection, &doc, None)?;
        coll.docs.push(doc);
        self.inner.counters.inserts.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        self.inner.counters.deletes.fetch_add(1, Ordering::AcqRel);
        let Some(mut coll) = self.inner.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = coll.docs.len();
        coll.docs.retain(|d| !filter.matches(d));
        let deleted = (before - coll.docs.len()) as u64;
        debug!("deleted {} records from {}", deleted, collection);
        Ok(deleted)
    }

    fn update_or_replace(
        &self,
        collection: &str,
        filter: &Filter,
        mut doc: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        self.inner.counters.updates.fetch_add(1, Ordering::AcqRel);
        let mut coll = self.inner.collections.entry(collection.to_string()).or_default();

        if let Some(pos) = coll.docs.iter().position(|d| filter.matches(d)) {
            // the replacement keeps the record's identity.
            if let Some(id) = coll.docs[pos].get(field::ID).cloned() {
                doc.insert(field::ID, id);
            }
            coll.check_unique(collection, &doc, Some(pos))?;
            coll.docs[pos] = doc;
            return Ok(UpdateOutcome {
                matched:     1,
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome {
                matched:     0,
                upserted_id: None,
            });
        }

        for (f, v) in filter.equalities() {
            if !doc.contains_key(f) {
                doc.insert(f, v.clone());
            }
        }
        let id = match doc.get(field::ID) {
            Some(id) => id.clone(),
            None => {
                let id = Value::from(ObjectId::new());
                doc.insert(field::ID, id.clone());
                id
            }
        };
        coll.check_unique(collection, &doc, None)?;
        coll.docs.push(doc);
        Ok(UpdateOutcome {
            matched:     0,
            upserted_id: Some(id),
        })
    }

    fn query(&self, collection: &str, filter: &Filter, options: &FindOptions) -> Result<CursorRef> {
        self.inner.counters.queries.fetch_add(1, Ordering::AcqRel);

        let mut results = match self.inner.collections.get(collection) {
            Some(coll) => coll
                .docs
                .iter()
                .filter(|d| filter.matches(d))
                .cloned()
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };
        if let Some(sort) = &options.sort {
            // stable, so ties keep insertion order.
            results.sort_by(|a, b| sort.compare(a, b));
        }
        let mut results = results
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit.map_or(usize::MAX, |l| l as usize))
            .map(|d| match &options.projection {
                Some(p) => p.apply(&d),
                None => d,
            })
            .collect::<VecDeque<_>>();

        let batch_size = match options.batch_size {
            0 => self.inner.default_batch_size,
            n => n,
        } as usize;
        let first = results.drain(..batch_size.min(results.len())).collect::<Vec<_>>();
        let id = self.inner.next_cursor_id();
        let server_open = !results.is_empty();
        debug!(
            "query {} on {}: first batch {}, left on server {}",
            id,
            collection,
            first.len(),
            results.len()
        );
        if server_open {
            self.inner.cursors.insert(
                id,
                ServerCursor {
                    collection: collection.to_string(),
                    batch_size,
                    remaining: results,
                },
            );
        }
        Ok(Box::new(MemoryCursor {
            inner: self.inner.clone(),
            id,
            first_batch: Some(first),
            server_open,
        }))
    }

    fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self
            .inner
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.iter().filter(|d| filter.matches(d)).count() as u64))
    }

    fn ensure_index(&self, collection: &str, index: &IndexModel) -> Result<()> {
        ensure!(
            !index.keys.is_empty(),
            InvalidIndexSnafu {
                collection,
                index: index.name.clone(),
                reason: "an index needs at least one key",
            }
        );
        let mut coll = self.inner.collections.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.name == index.name) {
            return Ok(());
        }
        if index.unique {
            let mut keys = coll.docs.iter().map(|d| index.key_of(d)).collect::<Vec<_>>();
            keys.sort_by(|a, b| {
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.compare(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if let Some(dup) = keys.windows(2).find(|w| w[0] == w[1]) {
                return InvalidIndexSnafu {
                    collection,
                    index: index.name.clone(),
                    reason: format!("duplicate key {}", render_key(&dup[0])),
                }
                .fail();
            }
        }
        debug!("index {} created on {}", index.name, collection);
        coll.indexes.push(index.clone());
        Ok(())
    }

    fn drop_collection(&self, collection: &str) -> Result<()> {
        self.inner.collections.remove(collection);
        self.inner.cursors.retain(|_, c| c.collection != collection);
        debug!("collection {} dropped", collection);
        Ok(())
    }
}

/// The client half of a query: the first batch arrives with the query, the
/// rest are pulled with get-more round trips.
struct MemoryCursor {
    inner:       Arc<Inner>,
    id:          CursorId,
    first_batch: Option<Vec<Document>>,
    server_open: bool,
}

impl Cursor for MemoryCursor {
    fn id(&self) -> CursorId { self.id }

    fn next_batch(&mut self) -> Result<Option<Vec<Document>>> {
        if let Some(first) = self.first_batch.take() {
            if !first.is_empty() {
                return Ok(Some(first));
            }
        }
        if !self.server_open {
            return Ok(None);
        }
        let (batch, exhausted) = match self.inner.get_more(self.id) {
            Ok(v) => v,
            Err(e) => {
                self.server_open = false;
                return Err(e);
            }
        };
        if exhausted {
            self.server_open = false;
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn is_alive(&self) -> bool {
        self.server_open || self.first_batch.as_ref().is_some_and(|b| !b.is_empty())
    }

    fn kill(&mut self) {
        self.first_batch = None;
        if self.server_open {
            self.server_open = false;
            self.inner.kill_cursor(self.id);
        }
    }
}

impl Drop for MemoryCursor {
    fn drop(&mut self) { self.kill(); }
}

#[cfg(test)]
mod tests {
    use grist_types::{Projection, Sort};
    use grist_utils::logger::install_fmt_log;

    use super::*;
    use crate::backend::DocumentCursor;

    fn chunks(backend: &MemoryBackend, files_id: i64, count: i64) {
        for n in 0..count {
            backend
                .insert_one(
                    "fs.chunks",
                    Document::new()
                        .with("files_id", files_id)
                        .with("n", n)
                        .with("data", vec![n as u8]),
                )
                .unwrap();
        }
    }

    #[test]
    fn batches_and_get_more() {
        install_fmt_log();
        let backend = MemoryBackend::new("t");
        chunks(&backend, 1, 5);

        let opts = FindOptions::default()
            .with_sort(Sort::ascending("n"))
            .with_projection(Projection::include(["n", "data"]).without_id())
            .with_batch_size(2);
        let mut cursor = backend
            .query("fs.chunks", &Filter::all().eq("files_id", 1).gte("n", 1), &opts)
            .unwrap();
        assert!(cursor.is_alive());
        assert_eq!(backend.stats().open_cursors, 1);

        let first = cursor.next_batch().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].get_i64("n"), Some(1));
        assert!(!first[0].contains_key("_id"));
        assert_eq!(backend.stats().get_mores, 0);

        let second = cursor.next_batch().unwrap().unwrap();
        assert_eq!(second[1].get_i64("n"), Some(4));
        assert_eq!(backend.stats().get_mores, 1);
        // everything was handed out, the server forgot the cursor.
        assert!(!cursor.is_alive());
        assert_eq!(backend.stats().open_cursors, 0);
        assert!(cursor.next_batch().unwrap().is_none());
        assert_eq!(backend.stats().queries, 1);
    }

    #[test]
    fn kill_releases_server_state() {
        let backend = MemoryBackend::new("t");
        chunks(&backend, 1, 5);
        let opts = FindOptions::default().with_batch_size(1);
        let a = backend.query("fs.chunks", &Filter::all(), &opts).unwrap();
        let mut b = backend.query("fs.chunks", &Filter::all(), &opts).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(backend.stats().open_cursors, 2);

        b.kill();
        b.kill();
        assert!(!b.is_alive());
        drop(a);
        let stats = backend.stats();
        assert_eq!(stats.open_cursors, 0);
        assert_eq!(stats.killed_cursors, 2);
    }

    #[test]
    fn unique_indexes() {
        let backend = MemoryBackend::new("t");
        let index = IndexModel::new("files_id_1_n_1")
            .key("files_id", grist_types::SortOrder::Ascending)
            .key("n", grist_types::SortOrder::Ascending)
            .unique(true);
        backend.ensure_index("fs.chunks", &index).unwrap();
        backend.ensure_index("fs.chunks", &index).unwrap();
        assert_eq!(backend.index_names("fs.chunks"), vec!["files_id_1_n_1".to_string()]);

        chunks(&backend, 1, 2);
        let err = backend
            .insert_one("fs.chunks", Document::new().with("files_id", 1).with("n", 1))
            .unwrap_err();
        assert!(err.is_duplicate_key());
        chunks(&backend, 2, 2);

        let id = backend.insert_one("fs.files", Document::new().with("_id", 7)).unwrap();
        assert_eq!(id, Value::Int(7));
        assert!(backend
            .insert_one("fs.files", Document::new().with("_id", 7))
            .unwrap_err()
            .is_duplicate_key());
    }

    #[test]
    fn upsert_and_replace() {
        let backend = MemoryBackend::new("t");
        let filter = Filter::all().eq("files_id", 1).eq("n", 0);
        let out = backend
            .update_or_replace("fs.chunks", &filter, Document::new().with("data", vec![1u8]), true)
            .unwrap();
        assert_eq!(out.matched, 0);
        assert!(out.upserted_id.is_some());

        let out = backend
            .update_or_replace(
                "fs.chunks",
                &filter,
                Document::new().with("files_id", 1).with("n", 0).with("data", vec![2u8]),
                true,
            )
            .unwrap();
        assert_eq!(out.matched, 1);
        assert_eq!(backend.count_documents("fs.chunks", &Filter::all()).unwrap(), 1);

        let mut cursor =
            DocumentCursor::new(backend.query("fs.chunks", &filter, &FindOptions::default()).unwrap());
        let doc = cursor.next().unwrap().unwrap();
        assert_eq!(doc.get("data"), Some(&Value::from(vec![2u8])));
        assert!(cursor.next().unwrap().is_none());

        let missed = backend
            .update_or_replace("fs.chunks", &Filter::all().eq("n", 9), Document::new(), false)
            .unwrap();
        assert_eq!(missed.matched, 0);
        assert!(missed.upserted_id.is_none());
    }

    #[test]
    fn drop_kills_cursors() {
        let backend = MemoryBackend::new("t");
        chunks(&backend, 1, 4);
        let mut cursor = backend
            .query("fs.chunks", &Filter::all(), &FindOptions::default().with_batch_size(1))
            .unwrap();
        cursor.next_batch().unwrap();
        backend.drop_collection("fs.chunks").unwrap();
        backend.drop_collection("fs.chunks").unwrap();
        assert!(cursor.next_batch().unwrap_err().is_cursor_not_found());
        assert!(!cursor.is_alive());
        assert!(backend.collection_names().is_empty());
        assert_eq!(backend.delete_many("fs.chunks", &Filter::all()).unwrap(), 0);
    }
}
