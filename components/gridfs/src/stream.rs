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

use std::io::{self, IoSlice, IoSliceMut, Read, Seek, SeekFrom, Write};

use crate::file::GridFile;

/// Adapts a [GridFile] to [std::io]'s traits so it can go wherever a reader
/// or writer is expected. Flushing saves the file.
#[derive(Debug)]
pub struct GridStream {
    file: GridFile,
}

impl GridStream {
    pub fn new(file: GridFile) -> Self { GridStream { file } }

    pub fn get_ref(&self) -> &GridFile { &self.file }

    pub fn get_mut(&mut self) -> &mut GridFile { &mut self.file }

    pub fn into_inner(self) -> GridFile { self.file }
}

impl From<GridFile> for GridStream {
    fn from(file: GridFile) -> Self { GridStream::new(file) }
}

impl Read for GridStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { Ok(self.file.read(buf)?) }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> { Ok(self.file.readv(bufs)?) }
}

impl Write for GridStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { Ok(self.file.write(buf)?) }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> { Ok(self.file.writev(bufs)?) }

    fn flush(&mut self) -> io::Result<()> { Ok(self.file.save()?) }
}

impl Seek for GridStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { Ok(self.file.seek(pos)?) }

    fn stream_position(&mut self) -> io::Result<u64> { Ok(self.file.tell()) }
}
