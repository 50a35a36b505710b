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
    io::{ErrorKind, Read},
    sync::Arc,
};

use grist_common::{CHUNKS_INDEX_NAME, FILENAME_INDEX_NAME, MAX_CHUNK_SIZE};
use grist_store::{BackendRef, DocumentCursor, StoreConfig};
use grist_types::{
    field, Document, FileMetadata, Filter, FindOptions, IndexModel, ObjectId, Projection, SortOrder, Value,
};
use snafu::{ensure, ResultExt};
use tracing::{debug, info, instrument};

use crate::{
    config::Config,
    err::{FileNotFoundSnafu, InvalidArgumentSnafu, IoSnafu, ModelSnafu, Result, StoreSnafu},
    file::{remove_file, GridFile},
    list::FileList,
};

/// The collections one [GridFs] works on, shared with every handle it opens.
pub(crate) struct Namespace {
    pub(crate) backend: BackendRef,
    pub(crate) files:   String,
    pub(crate) chunks:  String,
    pub(crate) config:  Config,
}

pub(crate) type NamespaceRef = Arc<Namespace>;

/// Properties of a file about to be created. Unset fields fall back to the
/// [Config] or are left out of the files record.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub id:           Option<Value>,
    pub filename:     Option<String>,
    pub content_type: Option<String>,
    pub aliases:      Vec<String>,
    pub metadata:     Option<Document>,
    pub md5:          Option<String>,
    pub chunk_size:   Option<u64>,
}

impl FileOptions {
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_md5(mut self, md5: &str) -> Self {
        self.md5 = Some(md5.to_string());
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// [GridFs] manages one pair of collections: `<prefix>.files` with a record
/// per file, and `<prefix>.chunks` with the file contents cut into chunks.
pub struct GridFs {
    ns: NamespaceRef,
}

impl GridFs {
    /// Opens the collections under `config.prefix`, creating the indexes
    /// they need if missing.
    pub fn new(backend: BackendRef, config: Config) -> Result<Self> {
        let chunk_size = config.chunk_size.as_bytes();
        ensure!(
            chunk_size > 0 && chunk_size <= MAX_CHUNK_SIZE,
            InvalidArgumentSnafu {
                reason: format!("default chunk size {} is out of range", config.chunk_size),
            }
        );
        let ns = Namespace {
            backend,
            files: config.files_collection(),
            chunks: config.chunks_collection(),
            config,
        };

        let chunks_index = IndexModel::new(CHUNKS_INDEX_NAME)
            .key(field::FILES_ID, SortOrder::Ascending)
            .key(field::N, SortOrder::Ascending)
            .unique(true);
        ns.backend
            .ensure_index(&ns.chunks, &chunks_index)
            .context(StoreSnafu)?;
        let filename_index = IndexModel::new(FILENAME_INDEX_NAME).key(field::FILENAME, SortOrder::Ascending);
        ns.backend
            .ensure_index(&ns.files, &filename_index)
            .context(StoreSnafu)?;

        info!("gridfs ready on {} and {}", ns.files, ns.chunks);
        Ok(GridFs { ns: Arc::new(ns) })
    }

    /// Opens the store `store_config` names, then the collections on it.
    pub fn open(store_config: &StoreConfig, config: Config) -> Result<Self> {
        let backend = grist_store::open(store_config).context(StoreSnafu)?;
        Self::new(backend, config)
    }

    pub fn files_collection(&self) -> &str { &self.ns.files }

    pub fn chunks_collection(&self) -> &str { &self.ns.chunks }

    pub fn backend(&self) -> &BackendRef { &self.ns.backend }

    pub fn config(&self) -> &Config { &self.ns.config }

    /// Creates a file handle. Nothing is stored until the file is written to
    /// or saved.
    pub fn create_file(&self, opts: FileOptions) -> Result<GridFile> {
        let chunk_size = opts.chunk_size.unwrap_or(self.ns.config.chunk_size.as_bytes());
        ensure!(
            chunk_size > 0 && chunk_size <= MAX_CHUNK_SIZE,
            InvalidArgumentSnafu {
                reason: format!("chunk size {} is out of range", chunk_size),
            }
        );
        let id = opts.id.unwrap_or_else(|| Value::from(ObjectId::new()));
        let mut meta = FileMetadata::new(id, chunk_size);
        meta.filename = opts.filename;
        meta.content_type = opts.content_type;
        meta.aliases = opts.aliases;
        meta.metadata = opts.metadata;
        meta.md5 = opts.md5;
        debug!("created file {} with chunk size {}", meta.id, chunk_size);
        Ok(GridFile::created(self.ns.clone(), meta))
    }

    /// Creates a file holding everything `reader` yields, saved, and
    /// positioned at its start.
    #[instrument(skip_all)]
    pub fn create_file_from_reader<R: Read>(&self, mut reader: R, opts: FileOptions) -> Result<GridFile> {
        let mut file = self.create_file(opts)?;
        let mut buf = vec![0u8; file.chunk_size() as usize];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(IoSnafu),
            };
            file.write(&buf[..n])?;
        }
        file.save()?;
        file.seek(std::io::SeekFrom::Start(0))?;
        Ok(file)
    }

    /// Lists the files matching `filter`, in the order `options` sorts by.
    pub fn find(&self, filter: &Filter, options: FindOptions) -> Result<FileList> {
        let mut options = options;
        if options.batch_size == 0 {
            options.batch_size = self.ns.config.list_batch_size;
        }
        let cursor = self
            .ns
            .backend
            .query(&self.ns.files, filter, &options)
            .context(StoreSnafu)?;
        Ok(FileList::new(self.ns.clone(), DocumentCursor::new(cursor)))
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<GridFile>> {
        self.find(filter, FindOptions::default().with_limit(1))?.next().transpose()
    }

    pub fn find_one_by_filename(&self, filename: &str) -> Result<Option<GridFile>> {
        self.find_one(&Filter::all().eq(field::FILENAME, filename))
    }

    /// Removes every file named `filename` with its chunks. Returns how many
    /// files went away; none at all is an error.
    #[instrument(skip(self))]
    pub fn remove_by_filename(&self, filename: &str) -> Result<u64> {
        let options = FindOptions::default().with_projection(Projection::include([field::ID]));
        let cursor = self
            .ns
            .backend
            .query(&self.ns.files, &Filter::all().eq(field::FILENAME, filename), &options)
            .context(StoreSnafu)?;
        let mut cursor = DocumentCursor::new(cursor);
        let mut ids = Vec::new();
        while let Some(doc) = cursor.next().context(StoreSnafu)? {
            let id = doc
                .get(field::ID)
                .cloned()
                .ok_or_else(|| grist_types::err::MissingFieldSnafu { field: field::ID }.build())
                .context(ModelSnafu)?;
            ids.push(id);
        }
        ensure!(!ids.is_empty(), FileNotFoundSnafu { filename });

        for id in &ids {
            remove_file(&self.ns, id)?;
        }
        info!("removed {} files named {:?}", ids.len(), filename);
        Ok(ids.len() as u64)
    }

    /// Drops both collections with their indexes. Handles opened earlier are
    /// left pointing at nothing.
    pub fn drop(&self) -> Result<()> {
        self.ns
            .backend
            .drop_collection(&self.ns.files)
            .context(StoreSnafu)?;
        self.ns
            .backend
            .drop_collection(&self.ns.chunks)
            .context(StoreSnafu)?;
        info!("dropped {} and {}", self.ns.files, self.ns.chunks);
        Ok(())
    }
}

impl std::fmt::Debug for GridFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridFs")
            .field("files", &self.ns.files)
            .field("chunks", &self.ns.chunks)
            .field("config", &self.ns.config)
            .finish()
    }
}
