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
use tracing::error;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("store error: {source}"))]
    StoreError {
        source:   grist_store::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Chunks that don't add up to the recorded length, or a missing chunk.
    #[snafu(display("file {files_id} is inconsistent: {reason}"))]
    Inconsistent {
        files_id: String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("malformed record: {source}"))]
    ModelError {
        source:   grist_types::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("no file named {filename:?}"))]
    FileNotFound {
        filename: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to read the source stream"))]
    IoError {
        source:   std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool { matches!(self, Error::FileNotFound { .. }) }

    pub fn is_invalid_argument(&self) -> bool { matches!(self, Error::InvalidArgument { .. }) }

    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Error::Inconsistent { .. } | Error::ModelError { .. })
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match &value {
            Error::InvalidArgument { .. } => ErrorKind::InvalidInput,
            Error::Inconsistent { .. } | Error::ModelError { .. } => ErrorKind::InvalidData,
            Error::FileNotFound { .. } => ErrorKind::NotFound,
            Error::IoError { source, .. } => source.kind(),
            Error::StoreError { .. } => {
                error!("store error surfaced through io: {}", value);
                ErrorKind::Other
            }
        };
        std::io::Error::new(kind, value)
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use snafu::ResultExt;

    use super::*;

    fn store_err() -> std::result::Result<(), grist_store::Error> {
        grist_store::err::CursorNotFoundSnafu { id: 3u64 }.fail()
    }

    fn model_err() -> std::result::Result<(), grist_types::Error> {
        grist_types::err::MissingFieldSnafu { field: "chunkSize" }.fail()
    }

    #[test]
    fn every_variant_maps_to_an_io_kind() {
        let cases: Vec<(Error, ErrorKind)> = vec![
            (
                InvalidArgumentSnafu { reason: "negative seek" }.build(),
                ErrorKind::InvalidInput,
            ),
            (store_err().context(StoreSnafu).unwrap_err(), ErrorKind::Other),
            (
                InconsistentSnafu {
                    files_id: "1",
                    reason:   "chunk 2 is missing",
                }
                .build(),
                ErrorKind::InvalidData,
            ),
            (model_err().context(ModelSnafu).unwrap_err(), ErrorKind::InvalidData),
            (FileNotFoundSnafu { filename: "foo" }.build(), ErrorKind::NotFound),
            (
                Err::<(), _>(std::io::Error::from(ErrorKind::BrokenPipe))
                    .context(IoSnafu)
                    .unwrap_err(),
                ErrorKind::BrokenPipe,
            ),
        ];
        for (err, kind) in cases {
            let text = err.to_string();
            assert_eq!(std::io::Error::from(err).kind(), kind, "{text}");
        }
    }

    #[test]
    fn predicates() {
        assert!(FileNotFoundSnafu { filename: "foo" }.build().is_not_found());
        assert!(InvalidArgumentSnafu { reason: "x" }.build().is_invalid_argument());
        assert!(model_err().context(ModelSnafu).unwrap_err().is_inconsistent());
        assert!(!store_err().context(StoreSnafu).unwrap_err().is_inconsistent());
    }
}
