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

use serde::{de::DeserializeOwned, Serialize};

use crate::key_val_store::error::KeyValStoreError;

/// Returned by the closure passed to `for_each_from` to decide whether iteration should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    /// Continue the iteration
    Continue,
    /// Stop the iteration
    Break,
}

/// A single mutation within a [WriteBatch]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOperation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered list of mutations that a [KeyValueStore] applies atomically. Either every operation in the batch is
/// durable after `write` returns `Ok`, or none of them are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<WriteOperation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Default::default()
    }

    /// Stage a put of `value` under `key`. Existing values are overwritten.
    pub fn put<K: Into<Vec<u8>>, V: Into<Vec<u8>>>(&mut self, key: K, value: V) -> &mut Self {
        self.operations.push(WriteOperation::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Serialize `value` with bincode and stage a put under `key`.
    pub fn put_serialized<K: Into<Vec<u8>>, V: Serialize>(
        &mut self,
        key: K,
        value: &V,
    ) -> Result<&mut Self, KeyValStoreError> {
        let mut buf = Vec::with_capacity(64);
        bincode::serialize_into(&mut buf, value).map_err(|e| KeyValStoreError::DatabaseError(e.to_string()))?;
        Ok(self.put(key, buf))
    }

    /// Stage a delete of `key`. Deleting a key that does not exist is not an error.
    pub fn delete<K: Into<Vec<u8>>>(&mut self, key: K) -> &mut Self {
        self.operations.push(WriteOperation::Delete { key: key.into() });
        self
    }

    /// Append all operations of `other` to this batch
    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.operations.extend(other.operations);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_operations(self) -> Vec<WriteOperation> {
        self.operations
    }
}

/// General behaviour of an ordered, byte-keyed store. Keys are compared lexicographically so iteration from a key
/// visits every following key in ascending byte order.
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value stored at `key`, or None if the key does not exist
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KeyValStoreError>;

    /// Apply every operation in `batch` atomically
    fn write(&self, batch: WriteBatch) -> Result<(), KeyValStoreError>;

    /// Iterate over all records with a key greater than or equal to `start`, in ascending key order, until `f`
    /// returns [IterationResult::Break] or the end of the store is reached.
    fn for_each_from<F>(&self, start: &[u8], f: F) -> Result<(), KeyValStoreError>
    where
        Self: Sized,
        F: FnMut(&[u8], &[u8]) -> IterationResult;

    /// Returns the total number of records in the store
    fn size(&self) -> Result<usize, KeyValStoreError>;

    /// Checks whether a record exists for the provided `key`
    fn exists(&self, key: &[u8]) -> Result<bool, KeyValStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert a single record
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KeyValStoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Remove a single record
    fn delete(&self, key: &[u8]) -> Result<(), KeyValStoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Get the value stored at `key` and deserialize it from bincode into `V`
    fn get_deserialized<V: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<V>, KeyValStoreError>
    where Self: Sized {
        match self.get(key)? {
            Some(buf) => bincode::deserialize(&buf)
                .map(Some)
                .map_err(|e| KeyValStoreError::DatabaseError(e.to_string())),
            None => Ok(None),
        }
    }
}

impl<T: KeyValueStore> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KeyValStoreError> {
        (**self).get(key)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KeyValStoreError> {
        (**self).write(batch)
    }

    fn for_each_from<F>(&self, start: &[u8], f: F) -> Result<(), KeyValStoreError>
    where F: FnMut(&[u8], &[u8]) -> IterationResult {
        (**self).for_each_from(start, f)
    }

    fn size(&self) -> Result<usize, KeyValStoreError> {
        (**self).size()
    }
}
