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

use crate::{
    key_val_store::{
        error::KeyValStoreError,
        key_val_store::{IterationResult, KeyValueStore, WriteBatch},
    },
    lmdb_store::LMDBDatabase,
};

impl KeyValueStore for LMDBDatabase {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KeyValStoreError> {
        LMDBDatabase::get(self, key).map_err(Into::into)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), KeyValStoreError> {
        LMDBDatabase::write(self, batch).map_err(Into::into)
    }

    fn for_each_from<F>(&self, start: &[u8], f: F) -> Result<(), KeyValStoreError>
    where F: FnMut(&[u8], &[u8]) -> IterationResult {
        LMDBDatabase::for_each_from(self, start, f).map_err(Into::into)
    }

    fn size(&self) -> Result<usize, KeyValStoreError> {
        self.len().map_err(Into::into)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KeyValStoreError> {
        self.contains_key(key).map_err(Into::into)
    }
}
