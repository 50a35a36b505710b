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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::value::{Document, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One predicate on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        // A missing field behaves like null for equality, and never
        // satisfies a range.
        let null = Value::Null;
        let v = field.unwrap_or(&null);
        match self {
            Condition::Eq(want) => v == want,
            Condition::Ne(want) => v != want,
            Condition::In(wants) => wants.iter().any(|w| v == w),
            Condition::Gt(bound) => field.is_some() && v.same_kind(bound) && v.compare(bound).is_gt(),
            Condition::Gte(bound) => field.is_some() && v.same_kind(bound) && v.compare(bound).is_ge(),
            Condition::Lt(bound) => field.is_some() && v.same_kind(bound) && v.compare(bound).is_lt(),
            Condition::Lte(bound) => field.is_some() && v.same_kind(bound) && v.compare(bound).is_le(),
        }
    }
}

/// A conjunction of field predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    pub fn all() -> Self { Self::default() }

    pub fn with(mut self, field: impl Into<String>, cond: Condition) -> Self {
        self.clauses.push((field.into(), cond));
        self
    }

    pub fn eq(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(v.into()))
    }

    pub fn ne(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Ne(v.into()))
    }

    pub fn gt(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(v.into()))
    }

    pub fn gte(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Gte(v.into()))
    }

    pub fn lt(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(v.into()))
    }

    pub fn lte(self, field: impl Into<String>, v: impl Into<Value>) -> Self {
        self.with(field, Condition::Lte(v.into()))
    }

    pub fn is_in(self, field: impl Into<String>, vs: Vec<Value>) -> Self {
        self.with(field, Condition::In(vs))
    }

    pub fn clauses(&self) -> &[(String, Condition)] { &self.clauses }

    pub fn is_empty(&self) -> bool { self.clauses.is_empty() }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, cond)| cond.matches(doc.get_path(field)))
    }

    /// Top level `field == value` clauses, which an upsert copies into the
    /// record it creates.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().filter_map(|(f, c)| match c {
            Condition::Eq(v) if !f.contains('.') => Some((f.as_str(), v)),
            _ => None,
        })
    }
}

/// Sort keys, most significant first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort(Vec<(String, SortOrder)>);

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self { Sort(vec![(field.into(), SortOrder::Ascending)]) }

    pub fn descending(field: impl Into<String>) -> Self {
        Sort(vec![(field.into(), SortOrder::Descending)])
    }

    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.0.push((field.into(), order));
        self
    }

    pub fn keys(&self) -> &[(String, SortOrder)] { &self.0 }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, order) in &self.0 {
            let null = Value::Null;
            let va = a.get_path(field).unwrap_or(&null);
            let vb = b.get_path(field).unwrap_or(&null);
            let ord = match order {
                SortOrder::Ascending => va.compare(vb),
                SortOrder::Descending => vb.compare(va),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Which fields a query hands back. `_id` is included unless dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    fields:     Vec<String>,
    include_id: bool,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection {
            fields:     fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }

    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::new();
        if self.include_id {
            if let Some(id) = doc.get(crate::field::ID) {
                out.insert(crate::field::ID, id.clone());
            }
        }
        for f in &self.fields {
            if let Some(v) = doc.get(f) {
                out.insert(f.clone(), v.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort:       Option<Sort>,
    pub projection: Option<Projection>,
    /// Records per round trip, 0 lets the backend choose.
    pub batch_size: u32,
    pub limit:      Option<u64>,
    pub skip:       u64,
}

impl FindOptions {
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }
}

/// A secondary index over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    pub name:   String,
    pub keys:   Vec<(String, SortOrder)>,
    pub unique: bool,
}

impl IndexModel {
    pub fn new(name: impl Into<String>) -> Self {
        IndexModel {
            name:   name.into(),
            keys:   Vec::new(),
            unique: false,
        }
    }

    pub fn key(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The index key of `doc`; missing fields index as null.
    pub fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|(f, _)| doc.get_path(f).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
