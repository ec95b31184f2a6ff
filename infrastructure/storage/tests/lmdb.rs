// Copyright 2019, The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{sync::Arc, thread};

use rand::{rngs::OsRng, RngCore};
use tari_storage::{
    lmdb_store::{db, LMDBBuilder, LMDBDatabase, LMDBError, LMDBStore},
    IterationResult,
    KeyValueStore,
    WriteBatch,
};
use tempfile::{tempdir, TempDir};

fn init(dir: &TempDir) -> Result<LMDBStore, LMDBError> {
    LMDBBuilder::new()
        .set_path(dir.path())
        .set_environment_size(10)
        .set_max_number_of_databases(2)
        .add_database("records", db::CREATE)
        .build()
}

fn seq_key(prefix: u8, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn insert_records(db: &LMDBDatabase, n: u64) {
    let mut batch = WriteBatch::new();
    for i in 1..=n {
        batch.put(seq_key(0, i), i.to_be_bytes().to_vec());
    }
    KeyValueStore::write(db, batch).unwrap();
}

#[test]
fn single_thread() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    let db = store.get_handle("records").unwrap();
    insert_records(&db, 100);
    for i in 1..=100u64 {
        let val = db.get(&seq_key(0, i)).unwrap().unwrap();
        assert_eq!(val, i.to_be_bytes().to_vec());
    }
    assert_eq!(db.len().unwrap(), 100);
}

#[test]
fn multi_thread_readers() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    let db = Arc::new(store.get_handle("records").unwrap());
    insert_records(&db, 50);
    let mut threads = Vec::new();
    for i in 1..=10u64 {
        let db = db.clone();
        threads.push(thread::spawn(move || {
            let val = db.get(&seq_key(0, i * 5)).unwrap().unwrap();
            assert_eq!(val, (i * 5).to_be_bytes().to_vec());
        }));
    }
    for t in threads {
        t.join().unwrap();
    }
}

#[test]
fn iteration_follows_big_endian_sequence_order() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    let db = store.get_handle("records").unwrap();
    // Insert out of order, including values that would sort wrongly as little-endian
    let mut batch = WriteBatch::new();
    for i in [256u64, 1, 255, 65536, 2] {
        batch.put(seq_key(0, i), i.to_be_bytes().to_vec());
    }
    batch.put(seq_key(1, 0), b"reserved".to_vec());
    KeyValueStore::write(&db, batch).unwrap();

    let mut seen = Vec::new();
    db.for_each_from(&seq_key(0, 2), |key, _| {
        if key[0] != 0 {
            return IterationResult::Break;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&key[1..]);
        seen.push(u64::from_be_bytes(buf));
        IterationResult::Continue
    })
    .unwrap();
    assert_eq!(seen, vec![2, 255, 256, 65536]);
}

#[test]
fn iteration_past_the_end_is_empty() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    let db = store.get_handle("records").unwrap();
    insert_records(&db, 3);
    let mut count = 0;
    db.for_each_from(&[0xff], |_, _| {
        count += 1;
        IterationResult::Continue
    })
    .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn batch_with_puts_and_deletes_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = init(&dir).unwrap();
        let db = store.get_handle("records").unwrap();
        insert_records(&db, 10);
        let mut batch = WriteBatch::new();
        batch
            .delete(seq_key(0, 3))
            .delete(seq_key(0, 4))
            .put(seq_key(2, 0), 8u64.to_be_bytes().to_vec());
        KeyValueStore::write(&db, batch).unwrap();
        store.flush().unwrap();
    }

    let store = init(&dir).unwrap();
    let db = store.get_handle("records").unwrap();
    assert!(db.get(&seq_key(0, 3)).unwrap().is_none());
    assert!(db.get(&seq_key(0, 4)).unwrap().is_none());
    assert_eq!(db.get(&seq_key(2, 0)).unwrap().unwrap(), 8u64.to_be_bytes().to_vec());
    assert_eq!(db.len().unwrap(), 9);
}

#[test]
fn large_values() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    let db = store.get_handle("records").unwrap();
    let mut val = vec![0u8; 4096];
    OsRng.fill_bytes(&mut val);
    KeyValueStore::put(&db, b"big", &val).unwrap();
    assert_eq!(db.get(b"big").unwrap().unwrap(), val);
}

#[test]
fn unknown_database_handle() {
    let dir = tempdir().unwrap();
    let store = init(&dir).unwrap();
    assert!(store.get_handle("missing").is_none());
}
