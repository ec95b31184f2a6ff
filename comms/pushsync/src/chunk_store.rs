// Copyright 2022, The Tari Project
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
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use log::*;
use thiserror::Error;

use crate::chunk::{Address, Chunk, MAX_CHUNK_SIZE};

const LOG_TARGET: &str = "comms::pushsync::chunk_store";

#[derive(Debug, Error)]
pub enum ChunkStoreError {
    #[error("Chunk {0} not found")]
    NotFound(Address),
    #[error("Chunk store is closed")]
    Closed,
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),
}

/// The result of a successful put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The chunk was not present and has been stored
    Stored,
    /// The chunk was already present. This is not an error.
    AlreadyExists,
}

/// The local chunk store: a mapping from chunk address to chunk data
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn put(&self, chunk: Chunk) -> Result<PutOutcome, ChunkStoreError>;

    async fn get(&self, address: &Address) -> Result<Chunk, ChunkStoreError>;

    async fn close(&self) -> Result<(), ChunkStoreError>;
}

/// A [ChunkStore] held in memory
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<Address, Bytes>>,
    is_closed: AtomicBool,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        acquire_read_lock!(self.chunks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &Address) -> bool {
        acquire_read_lock!(self.chunks).contains_key(address)
    }

    /// Remove a chunk, returning true if it was present
    pub fn remove(&self, address: &Address) -> bool {
        acquire_write_lock!(self.chunks).remove(address).is_some()
    }

    fn check_open(&self) -> Result<(), ChunkStoreError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(ChunkStoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn put(&self, chunk: Chunk) -> Result<PutOutcome, ChunkStoreError> {
        self.check_open()?;
        if chunk.len() > MAX_CHUNK_SIZE {
            return Err(ChunkStoreError::InvalidChunk(format!(
                "chunk {} has {} bytes which exceeds the maximum of {} bytes",
                chunk.address(),
                chunk.len(),
                MAX_CHUNK_SIZE
            )));
        }
        let mut chunks = acquire_write_lock!(self.chunks);
        if chunks.contains_key(chunk.address()) {
            trace!(target: LOG_TARGET, "Chunk {} already exists", chunk.address().short_str());
            return Ok(PutOutcome::AlreadyExists);
        }
        let address = *chunk.address();
        chunks.insert(address, chunk.into_data());
        Ok(PutOutcome::Stored)
    }

    async fn get(&self, address: &Address) -> Result<Chunk, ChunkStoreError> {
        self.check_open()?;
        acquire_read_lock!(self.chunks)
            .get(address)
            .map(|data| Chunk::new(*address, data.clone()))
            .ok_or(ChunkStoreError::NotFound(*address))
    }

    async fn close(&self) -> Result<(), ChunkStoreError> {
        self.is_closed.store(true, Ordering::Release);
        debug!(target: LOG_TARGET, "Memory chunk store closed");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn put_reports_existing_chunks() {
        let store = MemoryChunkStore::new();
        let chunk = Chunk::new(Address::new([1; 32]), vec![1, 2, 3]);
        assert_eq!(store.put(chunk.clone()).await.unwrap(), PutOutcome::Stored);
        assert_eq!(store.put(chunk.clone()).await.unwrap(), PutOutcome::AlreadyExists);
        assert_eq!(store.get(chunk.address()).await.unwrap(), chunk);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_chunk() {
        let store = MemoryChunkStore::new();
        let err = store.get(&Address::new([2; 32])).await.unwrap_err();
        assert!(matches!(err, ChunkStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_chunks() {
        let store = MemoryChunkStore::new();
        let chunk = Chunk::new(Address::new([1; 32]), vec![0u8; MAX_CHUNK_SIZE + 1]);
        assert!(matches!(
            store.put(chunk).await.unwrap_err(),
            ChunkStoreError::InvalidChunk(_)
        ));
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryChunkStore::new();
        store.close().await.unwrap();
        let chunk = Chunk::new(Address::new([1; 32]), vec![1]);
        assert!(matches!(store.put(chunk).await.unwrap_err(), ChunkStoreError::Closed));
    }
}
