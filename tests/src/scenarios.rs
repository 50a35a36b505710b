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

use std::io::{IoSlice, IoSliceMut, Read, Seek, SeekFrom, Write};

use grist_common::DEFAULT_CHUNK_SIZE;
use grist_gridfs::{FileOptions, GridStream};
use grist_store::Backend;
use grist_types::{Document, Filter, FindOptions, Sort, Value};
use tracing::info;

use crate::{gridfs_for_test, sample_text};

#[test]
fn create() {
    let (_store, fs) = gridfs_for_test("create");
    let mut file = fs
        .create_file(
            FileOptions::default()
                .with_filename("foo")
                .with_content_type("application/x-foo")
                .with_aliases(vec!["bar".to_string()]),
        )
        .unwrap();
    assert_eq!(file.filename(), Some("foo"));
    assert_eq!(file.chunk_size(), DEFAULT_CHUNK_SIZE);
    assert!(!file.is_saved());
    file.save().unwrap();
    assert!(file.is_saved());

    let found = fs.find_one_by_filename("foo").unwrap().unwrap();
    assert_eq!(found.id(), file.id());
    assert_eq!(found.content_type(), Some("application/x-foo"));
}

#[test]
fn remove() {
    let (store, fs) = gridfs_for_test("remove");
    let mut file = fs
        .create_file(FileOptions::default().with_filename("foo").with_chunk_size(4))
        .unwrap();
    file.write(b"some bytes to remove").unwrap();
    file.save().unwrap();
    let id = file.id().clone();

    file.remove().unwrap();
    drop(file);

    assert!(fs.find_one_by_filename("foo").unwrap().is_none());
    let chunks = store
        .count_documents(fs.chunks_collection(), &Filter::all().eq("files_id", id))
        .unwrap();
    assert_eq!(chunks, 0);
}

#[test]
fn list() {
    let (_store, fs) = gridfs_for_test("list");
    for i in (0..3).rev() {
        let mut file = fs
            .create_file(FileOptions::default().with_filename(&format!("file{i}")))
            .unwrap();
        file.write(format!("contents {i}").as_bytes()).unwrap();
    }

    let list = fs
        .find(
            &Filter::all(),
            FindOptions::default().with_sort(Sort::ascending("filename")),
        )
        .unwrap();
    let mut seen = 0;
    for (i, file) in list.enumerate() {
        let file = file.unwrap();
        assert_eq!(file.filename(), Some(format!("file{i}").as_str()));
        assert_eq!(file.length(), 10);
        seen += 1;
    }
    assert_eq!(seen, 3);

    let file = fs
        .find_one(&Filter::all().eq("filename", "file1"))
        .unwrap()
        .unwrap();
    assert_eq!(file.filename(), Some("file1"));
}

#[test]
fn properties() {
    let (store, fs) = gridfs_for_test("properties");
    let metadata = Value::from(serde_json::json!({"key": "value"}));
    let record = Document::new()
        .with("_id", 1)
        .with("md5", "abcd")
        .with("filename", "foo")
        .with("contentType", "text/plain")
        .with("aliases", vec![Value::from("alias1"), Value::from("alias2")])
        .with("metadata", metadata.clone())
        .with("chunkSize", 100)
        .with("length", 0)
        .with("uploadDate", Value::DateTime(1_000_000));
    store.insert_one(fs.files_collection(), record).unwrap();

    let file = fs.find_one(&Filter::all().eq("_id", 1)).unwrap().unwrap();
    assert_eq!(file.id(), &Value::from(1));
    assert_eq!(file.md5(), Some("abcd"));
    assert_eq!(file.filename(), Some("foo"));
    assert_eq!(file.content_type(), Some("text/plain"));
    assert_eq!(file.aliases(), ["alias1", "alias2"]);
    assert_eq!(file.chunk_size(), 100);
    assert_eq!(file.length(), 0);
    assert_eq!(file.metadata().map(|m| Value::from(m.clone())), Some(metadata));
    assert_eq!(
        file.upload_date(),
        std::time::UNIX_EPOCH + std::time::Duration::from_secs(1000)
    );
}

#[test]
fn create_from_stream() {
    let (_store, fs) = gridfs_for_test("from_stream");
    let body = sample_text(300 * 1024);
    let mut source = tempfile::tempfile().unwrap();
    source.write_all(&body).unwrap();
    source.rewind().unwrap();

    let file = fs
        .create_file_from_reader(source, FileOptions::default().with_filename("large"))
        .unwrap();
    assert_eq!(file.length(), body.len() as u64);
    drop(file);

    let mut stream = GridStream::new(fs.find_one_by_filename("large").unwrap().unwrap());
    let mut back = Vec::new();
    stream.read_to_end(&mut back).unwrap();
    assert_eq!(back, body);
}

#[test]
fn seek() {
    let (_store, fs) = gridfs_for_test("seek");
    let body = sample_text(600 * 1024);
    let mut file = fs
        .create_file_from_reader(&body[..], FileOptions::default())
        .unwrap();
    let chunk_size = file.chunk_size();

    assert_eq!(file.seek(SeekFrom::Start(chunk_size)).unwrap(), chunk_size);
    assert_eq!(file.tell(), chunk_size);

    assert_eq!(file.seek(SeekFrom::Current(-1)).unwrap(), chunk_size - 1);
    let mut buf = [0u8; 2];
    assert_eq!(file.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..], &body[chunk_size as usize - 1..chunk_size as usize + 1]);
    assert_eq!(file.tell(), chunk_size + 1);

    assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), body.len() as u64);
    assert_eq!(file.read(&mut buf).unwrap(), 0);
    assert!(file.seek(SeekFrom::End(-(body.len() as i64) - 1)).is_err());
    assert_eq!(file.tell(), body.len() as u64);
}

#[test]
fn long_seek() {
    const CHUNK: u64 = 4 * 1024;
    let (store, fs) = gridfs_for_test("long_seek");
    let mut config = fs.config().clone();
    config.with_read_batch_size(2);
    let fs = grist_gridfs::GridFs::new(fs.backend().clone(), config).unwrap();

    let mut file = fs
        .create_file(FileOptions::default().with_filename("long").with_chunk_size(CHUNK))
        .unwrap();
    let body = sample_text(20 * CHUNK as usize);
    file.write(&body).unwrap();
    file.save().unwrap();

    let mut buf = [0u8; 16];
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read(&mut buf).unwrap();
    let first = file.cursor_id().unwrap();

    // the next chunk is already buffered.
    file.seek(SeekFrom::Start(CHUNK + 8)).unwrap();
    file.read(&mut buf).unwrap();
    assert_eq!(file.cursor_id(), Some(first));

    let queries = store.stats().queries;
    file.seek(SeekFrom::Start(CHUNK * 10)).unwrap();
    file.read(&mut buf).unwrap();
    assert_eq!(&buf[..], &body[(CHUNK * 10) as usize..(CHUNK * 10) as usize + 16]);
    assert_ne!(file.cursor_id(), Some(first));
    assert_eq!(store.stats().queries, queries + 1);
    info!("long seek moved from cursor {} to {:?}", first, file.cursor_id());
}

#[test]
fn read() {
    let (_store, fs) = gridfs_for_test("read");
    let body = sample_text(400 * 1024);
    let mut file = fs
        .create_file_from_reader(&body[..], FileOptions::default())
        .unwrap();

    let (mut a, mut b) = ([0u8; 10], [0u8; 10]);
    let mut iov = [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)];
    assert_eq!(file.readv(&mut iov).unwrap(), 20);
    assert_eq!(&a, b"Bacon ipsu");
    assert_eq!(&b, b"m dolor si");

    file.seek(SeekFrom::Start(1)).unwrap();
    let mut iov = [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)];
    assert_eq!(file.readv(&mut iov).unwrap(), 20);
    assert_eq!(&a, b"acon ipsum");
    assert_eq!(&b, b" dolor sit");

    // straddles the first chunk boundary.
    let start = file.chunk_size() - 1;
    file.seek(SeekFrom::Start(start)).unwrap();
    let mut iov = [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)];
    assert_eq!(file.readv(&mut iov).unwrap(), 20);
    assert_eq!(file.tell(), start + 20);
    assert_eq!(&a[..], &body[start as usize..start as usize + 10]);
    assert_eq!(&b[..], &body[start as usize + 10..start as usize + 20]);
}

#[test]
fn write() {
    let (_store, fs) = gridfs_for_test("write");
    let mut file = fs
        .create_file(FileOptions::default().with_filename("foo").with_chunk_size(2))
        .unwrap();
    let iov = [IoSlice::new(b"foo"), IoSlice::new(b" bar"), IoSlice::new(b" baz")];
    assert_eq!(file.writev(&iov).unwrap(), 11);
    assert_eq!(file.seek(SeekFrom::Start(0)).unwrap(), 0);

    let mut buf = [0u8; 11];
    assert_eq!(file.read(&mut buf).unwrap(), 11);
    assert_eq!(&buf, b"foo bar baz");

    file.seek(SeekFrom::Start(2)).unwrap();
    assert_eq!(file.write(b" baz").unwrap(), 4);
    file.seek(SeekFrom::Start(0)).unwrap();
    assert_eq!(file.read(&mut buf).unwrap(), 11);
    assert_eq!(&buf, b"fo bazr baz");
    file.save().unwrap();

    let mut reopened = fs.find_one_by_filename("foo").unwrap().unwrap();
    let mut buf = [0u8; 11];
    assert_eq!(reopened.read(&mut buf).unwrap(), 11);
    assert_eq!(&buf, b"fo bazr baz");
}

#[test]
fn empty() {
    let (_store, fs) = gridfs_for_test("empty");
    let mut file = fs
        .create_file_from_reader(std::io::empty(), FileOptions::default().with_filename("empty"))
        .unwrap();
    assert_eq!(file.length(), 0);

    for whence in [SeekFrom::Start(0), SeekFrom::Current(0), SeekFrom::End(0)] {
        assert_eq!(file.seek(whence).unwrap(), 0);
    }
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf[..0]).unwrap(), 0);
    assert_eq!(file.read(&mut buf).unwrap(), 0);
    assert_eq!(file.tell(), 0);

    assert!(fs.find_one_by_filename("empty").unwrap().is_some());
}

#[test]
fn stream() {
    let (_store, fs) = gridfs_for_test("stream");
    let body = sample_text(100 * 1024);
    let file = fs
        .create_file_from_reader(&body[..], FileOptions::default().with_chunk_size(1000))
        .unwrap();

    let mut stream = GridStream::new(file);
    let mut buf = vec![0u8; 4096];
    let mut total = 0;
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        assert_eq!(&buf[..n], &body[total..total + n]);
        total += n;
    }
    assert_eq!(total, body.len());
}

#[test]
fn remove_by_filename() {
    let (store, fs) = gridfs_for_test("remove_by_filename");
    for _ in 0..2 {
        let mut file = fs
            .create_file(FileOptions::default().with_filename("foo_file").with_chunk_size(8))
            .unwrap();
        file.write(b"removed by name").unwrap();
        file.save().unwrap();
    }
    let mut other = fs
        .create_file(FileOptions::default().with_filename("bar_file"))
        .unwrap();
    other.write(b"stays").unwrap();
    other.save().unwrap();

    assert_eq!(fs.remove_by_filename("foo_file").unwrap(), 2);
    assert!(fs.find_one_by_filename("foo_file").unwrap().is_none());
    assert!(fs.find_one_by_filename("bar_file").unwrap().is_some());
    assert_eq!(
        store
            .count_documents(fs.chunks_collection(), &Filter::all())
            .unwrap(),
        1
    );

    let err = fs.remove_by_filename("foo_file").unwrap_err();
    assert!(err.is_not_found());
}
