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

pub mod chunk;
pub mod err;
pub mod file_meta;
pub mod oid;
pub mod query;
pub mod value;

pub use chunk::ChunkRecord;
pub use err::{Error, Result};
pub use file_meta::FileMetadata;
pub use oid::ObjectId;
pub use query::{Condition, Filter, FindOptions, IndexModel, Projection, Sort, SortOrder};
pub use value::{Document, Value};

/// Field names of the two persisted record shapes. They are shared with
/// every other implementation of the layout, so they never change.
pub mod field {
    pub const ID: &str = "_id";
    pub const FILENAME: &str = "filename";
    pub const CONTENT_TYPE: &str = "contentType";
    pub const ALIASES: &str = "aliases";
    pub const METADATA: &str = "metadata";
    pub const MD5: &str = "md5";
    pub const CHUNK_SIZE: &str = "chunkSize";
    pub const LENGTH: &str = "length";
    pub const UPLOAD_DATE: &str = "uploadDate";

    pub const FILES_ID: &str = "files_id";
    pub const N: &str = "n";
    pub const DATA: &str = "data";
}
