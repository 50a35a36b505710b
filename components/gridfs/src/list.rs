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

use std::iter::FusedIterator;

use grist_store::DocumentCursor;
use grist_types::FileMetadata;
use snafu::ResultExt;
use tracing::warn;

use crate::{
    err::{ModelSnafu, Result, StoreSnafu},
    file::GridFile,
    gridfs::NamespaceRef,
};

/// Files matching a [crate::GridFs::find] query, opened one at a time as the
/// iteration reaches them. It can't be restarted; once it yields `None` or an
/// error it stays done.
pub struct FileList {
    ns:     NamespaceRef,
    cursor: DocumentCursor,
    done:   bool,
}

impl FileList {
    pub(crate) fn new(ns: NamespaceRef, cursor: DocumentCursor) -> Self {
        FileList {
            ns,
            cursor,
            done: false,
        }
    }

    fn next_file(&mut self) -> Result<Option<GridFile>> {
        let Some(doc) = self.cursor.next().context(StoreSnafu)? else {
            return Ok(None);
        };
        let meta = FileMetadata::from_document(&doc).context(ModelSnafu)?;
        Ok(Some(GridFile::opened(self.ns.clone(), meta)))
    }
}

impl Iterator for FileList {
    type Item = Result<GridFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_file() {
            Ok(Some(file)) => Some(Ok(file)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                warn!("file listing stopped: {}", e);
                self.done = true;
                self.cursor.kill();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for FileList {}
