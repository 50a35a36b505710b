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

use bytes::Bytes;
use snafu::OptionExt;

use crate::{
    err::{InvalidFieldTypeSnafu, MissingFieldSnafu, Result},
    field,
    file_meta::get_u64,
    value::{Document, Value},
};

/// One fixed size segment of a file's content.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub files_id: Value,
    /// Zero based sequence number within the file.
    pub n:        u64,
    pub data:     Bytes,
}

impl ChunkRecord {
    pub fn new(files_id: Value, n: u64, data: impl Into<Bytes>) -> Self {
        ChunkRecord {
            files_id,
            n,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize { self.data.len() }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    pub fn to_document(&self) -> Document {
        Document::new()
            .with(field::FILES_ID, self.files_id.clone())
            .with(field::N, self.n as i64)
            .with(field::DATA, self.data.clone())
    }

    /// Decodes a chunk record. Range reads project `files_id` away, in which
    /// case it decodes as null.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let n = get_u64(doc, field::N)?.context(MissingFieldSnafu { field: field::N })?;
        let data = match doc.get(field::DATA).context(MissingFieldSnafu { field: field::DATA })? {
            Value::Binary(b) => b.clone(),
            // some writers store text payloads as strings.
            Value::String(s) => Bytes::from(s.clone().into_bytes()),
            other => {
                return InvalidFieldTypeSnafu {
                    field:    field::DATA,
                    expected: "binary",
                    found:    other.type_name(),
                }
                .fail()
            }
        };
        Ok(ChunkRecord {
            files_id: doc.get(field::FILES_ID).cloned().unwrap_or(Value::Null),
            n,
            data,
        })
    }
}
