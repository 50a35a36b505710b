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

use grist_common::CursorId;
use snafu::{Location, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    Unknown {
        #[snafu(implicit)]
        location: Location,
        source:   Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("unsupported store dsn: {dsn}"))]
    UnsupportedStoreDSN {
        #[snafu(implicit)]
        location: Location,
        dsn:      String,
    },

    #[snafu(display("duplicate key {key} in {collection} for index {index}"))]
    DuplicateKey {
        #[snafu(implicit)]
        location:   Location,
        collection: String,
        index:      String,
        key:        String,
    },

    #[snafu(display("cursor {id} not found, it may have been killed or exhausted"))]
    CursorNotFound {
        #[snafu(implicit)]
        location: Location,
        id:       CursorId,
    },

    #[snafu(display("cannot build index {index} on {collection}: {reason}"))]
    InvalidIndex {
        #[snafu(implicit)]
        location:   Location,
        collection: String,
        index:      String,
        reason:     String,
    },
}

impl Error {
    pub fn is_duplicate_key(&self) -> bool { matches!(self, Error::DuplicateKey { .. }) }

    pub fn is_cursor_not_found(&self) -> bool { matches!(self, Error::CursorNotFound { .. }) }
}
