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

use snafu::{Location, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding a persisted record into its typed model.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("missing field `{field}`"))]
    MissingField {
        field:    String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("field `{field}` should be {expected}, found {found}"))]
    InvalidFieldType {
        field:    String,
        expected: &'static str,
        found:    &'static str,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("field `{field}` is invalid: {reason}"))]
    InvalidFieldValue {
        field:    String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid object id {text:?}"))]
    InvalidObjectId {
        text:     String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    pub fn is_missing_field(&self) -> bool { matches!(self, Error::MissingField { .. }) }
}
