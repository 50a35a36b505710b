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

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use snafu::{ensure, OptionExt};

use crate::{
    err::{InvalidFieldTypeSnafu, InvalidFieldValueSnafu, MissingFieldSnafu, Result},
    field,
    value::{Document, Value},
};

/// [FileMetadata] is the in-memory mirror of one file's descriptor record.
///
/// Only `_id` and `chunkSize` are mandatory when decoding; records written
/// by other clients may leave the rest out.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    /// Any value; minted as an ObjectId unless the caller supplies one.
    pub id:           Value,
    pub filename:     Option<String>,
    pub content_type: Option<String>,
    pub aliases:      Vec<String>,
    /// Caller defined, never interpreted.
    pub metadata:     Option<Document>,
    /// Informational only, it is never recomputed here.
    pub md5:          Option<String>,
    pub chunk_size:   u64,
    pub length:       u64,
    /// Milliseconds since the unix epoch.
    pub upload_date:  i64,
}

impl FileMetadata {
    pub fn new(id: Value, chunk_size: u64) -> Self {
        FileMetadata {
            id,
            filename: None,
            content_type: None,
            aliases: Vec::new(),
            metadata: None,
            md5: None,
            chunk_size,
            length: 0,
            upload_date: now_millis(),
        }
    }

    pub fn upload_time(&self) -> SystemTime {
        if self.upload_date >= 0 {
            UNIX_EPOCH + Duration::from_millis(self.upload_date as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(self.upload_date.unsigned_abs())
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new()
            .with(field::ID, self.id.clone())
            .with(field::CHUNK_SIZE, self.chunk_size as i64)
            .with(field::LENGTH, self.length as i64)
            .with(field::UPLOAD_DATE, Value::DateTime(self.upload_date));
        if let Some(filename) = &self.filename {
            doc.insert(field::FILENAME, filename.as_str());
        }
        if let Some(content_type) = &self.content_type {
            doc.insert(field::CONTENT_TYPE, content_type.as_str());
        }
        if !self.aliases.is_empty() {
            let aliases = self.aliases.iter().map(|a| Value::from(a.as_str())).collect::<Vec<_>>();
            doc.insert(field::ALIASES, aliases);
        }
        if let Some(metadata) = &self.metadata {
            doc.insert(field::METADATA, metadata.clone());
        }
        if let Some(md5) = &self.md5 {
            doc.insert(field::MD5, md5.as_str());
        }
        doc
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let id = doc.get(field::ID).cloned().context(MissingFieldSnafu { field: field::ID })?;

        let chunk_size = get_u64(doc, field::CHUNK_SIZE)?.context(MissingFieldSnafu {
            field: field::CHUNK_SIZE,
        })?;
        ensure!(
            chunk_size > 0,
            InvalidFieldValueSnafu {
                field:  field::CHUNK_SIZE,
                reason: "chunk size must be positive",
            }
        );

        let aliases = match non_null(doc, field::ALIASES) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).context(InvalidFieldTypeSnafu {
                        field:    field::ALIASES,
                        expected: "array of strings",
                        found:    v.type_name(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return InvalidFieldTypeSnafu {
                    field:    field::ALIASES,
                    expected: "array",
                    found:    other.type_name(),
                }
                .fail()
            }
        };

        let metadata = match non_null(doc, field::METADATA) {
            None => None,
            Some(Value::Document(d)) => Some(d.clone()),
            Some(other) => {
                return InvalidFieldTypeSnafu {
                    field:    field::METADATA,
                    expected: "document",
                    found:    other.type_name(),
                }
                .fail()
            }
        };

        let upload_date = match non_null(doc, field::UPLOAD_DATE) {
            None => 0,
            Some(Value::DateTime(ms)) => *ms,
            Some(Value::Int(ms)) => *ms,
            Some(other) => {
                return InvalidFieldTypeSnafu {
                    field:    field::UPLOAD_DATE,
                    expected: "date",
                    found:    other.type_name(),
                }
                .fail()
            }
        };

        Ok(FileMetadata {
            id,
            filename: get_string(doc, field::FILENAME)?,
            content_type: get_string(doc, field::CONTENT_TYPE)?,
            aliases,
            metadata,
            md5: get_string(doc, field::MD5)?,
            chunk_size,
            length: get_u64(doc, field::LENGTH)?.unwrap_or(0),
            upload_date,
        })
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn non_null<'a>(doc: &'a Document, name: &str) -> Option<&'a Value> {
    doc.get(name).filter(|v| !v.is_null())
}

fn get_string(doc: &Document, name: &str) -> Result<Option<String>> {
    match non_null(doc, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => InvalidFieldTypeSnafu {
            field:    name,
            expected: "string",
            found:    other.type_name(),
        }
        .fail(),
    }
}

pub(crate) fn get_u64(doc: &Document, name: &str) -> Result<Option<u64>> {
    let Some(v) = non_null(doc, name) else {
        return Ok(None);
    };
    let n = v.as_i64().context(InvalidFieldTypeSnafu {
        field:    name,
        expected: "integer",
        found:    v.type_name(),
    })?;
    ensure!(
        n >= 0,
        InvalidFieldValueSnafu {
            field:  name,
            reason: format!("{n} is negative"),
        }
    );
    Ok(Some(n as u64))
}
