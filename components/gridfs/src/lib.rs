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

mod chunk_source;
mod config;
pub mod err;
mod file;
mod gridfs;
mod list;
mod reader;
mod stream;
mod writer;

pub use config::Config;
pub use err::{Error, Result};
pub use file::GridFile;
pub use gridfs::{FileOptions, GridFs};
pub use list::FileList;
pub use stream::GridStream;
