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

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::key_val_store::{
    error::KeyValStoreError,
    key_val_store::{IterationResult, KeyValueStore, WriteBatch, WriteOperation},
};

/// The BTreeMapDatabase mimics the behaviour of LMDBDatabase without keeping a persistent copy of the key-value
/// records. Records are kept in key order so that iteration matches the persistent backend.
#[derive(Default)]
pub struct BTreeMapDatabase {
    db: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl BTreeMapDatabase {
    pub fn new() -> Self {
        Self {
            db: RwLock::new(BTreeMap::new()),
        }
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KeyValStoreError> {
        self.db.read().map_err(|_| KeyValStoreError::PoisonedAccess)
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KeyValStoreError> {
        self.db.write().map_err(|_| KeyValStoreError::PoisonedAccess)
    }

    /// Returns true if the database contains no records
    pub fn is_empty(&self) -> Result<bool, KeyValStoreError> {
        Ok(self.read_lock()?.is_empty())
    }
}

impl KeyValueStore for BTreeMapDatabase {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KeyValStoreError> {
        Ok(self.read_lock()?.get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KeyValStoreError> {
        // Holding the write lock for the whole batch makes the batch atomic to readers
        let mut db = self.write_lock()?;
        for op in batch.into_operations() {
            match op {
                WriteOperation::Put { key, value } => {
                    db.insert(key, value);
                },
                WriteOperation::Delete { key } => {
                    db.remove(&key);
                },
            }
        }
        Ok(())
    }

    fn for_each_from<F>(&self, start: &[u8], mut f: F) -> Result<(), KeyValStoreError>
    where F: FnMut(&[u8], &[u8]) -> IterationResult {
        let db = self.read_lock()?;
        for (key, value) in db.range::<[u8], _>((Bound::Included(start), Bound::Unbounded)) {
            if f(key, value) == IterationResult::Break {
                break;
            }
        }
        Ok(())
    }

    fn size(&self) -> Result<usize, KeyValStoreError> {
        Ok(self.read_lock()?.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_batch_is_applied_in_order() {
        let db = BTreeMapDatabase::new();
        let mut batch = WriteBatch::new();
        batch.put(&b"a"[..], &b"apple"[..]).put(&b"b"[..], &b"banana"[..]).delete(&b"a"[..]);
        db.write(batch).unwrap();

        assert!(db.get(b"a").unwrap().is_none());
        assert_eq!(db.get(b"b").unwrap().unwrap(), b"banana");
        assert_eq!(db.size().unwrap(), 1);
    }

    #[test]
    fn for_each_from_iterates_in_key_order() {
        let db = BTreeMapDatabase::new();
        for k in [5u8, 1, 3, 2, 4] {
            db.put(&[0, k], &[k]).unwrap();
        }
        db.put(&[1], b"other").unwrap();

        let mut seen = Vec::new();
        db.for_each_from(&[0, 2], |k, v| {
            if k[0] != 0 {
                return IterationResult::Break;
            }
            seen.push(v[0]);
            IterationResult::Continue
        })
        .unwrap();
        assert_eq!(seen, vec![2, 3, 4, 5]);
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let db = BTreeMapDatabase::new();
        db.delete(b"nope").unwrap();
        assert!(db.is_empty().unwrap());
    }
}
