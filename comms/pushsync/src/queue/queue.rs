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

use std::{convert::TryInto, sync::Arc};

use log::*;
use tari_storage::{IterationResult, KeyValueStore};

use crate::{
    chunk::Address,
    queue::{
        PushItem,
        QueueEntry,
        QueueError,
        QueueKey,
        StoreBatch,
        WaitingIndex,
        ENTRY_PREFIX,
        LAST_SEQ_KEY,
        SIZE_KEY,
    },
    tags::ChunkState,
};

const LOG_TARGET: &str = "comms::pushsync::queue";

/// Entries read by a scan, and the sequence number the next scan should start from
pub type ScanResult = (Vec<(QueueKey, QueueEntry)>, u64);

/// The persistent push queue. The owner of this struct is the only writer: it allocates sequence numbers and stages
/// mutations. Commits and scans go through a [QueueDb], which can be cloned into other tasks.
pub struct PersistentQueue<B> {
    db: QueueDb<B>,
    last_seq: u64,
    size: u64,
}

impl<B: KeyValueStore + 'static> PersistentQueue<B> {
    /// Open the queue on `backend`, reading back the persisted counters
    pub fn open(backend: B) -> Result<Self, QueueError> {
        let db = QueueDb {
            backend: Arc::new(backend),
            index: WaitingIndex::new(),
        };
        let last_seq = db.read_last_seq()?;
        let size = db.read_size()?;
        info!(
            target: LOG_TARGET,
            "Push queue opened with {} entries (last sequence = {})", size, last_seq
        );
        Ok(Self { db, last_seq, size })
    }

    /// Stage `entry` in `batch` under the next sequence number and index it. If an earlier slot for the same address
    /// is still indexed, that slot is deleted in the same batch.
    pub fn enqueue(&mut self, batch: &mut StoreBatch, entry: QueueEntry) -> Result<Arc<PushItem>, QueueError> {
        let value = bincode::serialize(&entry).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let seq = self.last_seq + 1;
        let key = QueueKey::new(seq);
        batch.put_entry(key, value, seq);
        self.last_seq = seq;
        self.size += 1;

        let item = Arc::new(PushItem::new(key, entry));
        if let Some(prev) = self.db.index.insert(item.clone()) {
            // A synced item has already been staged for deletion
            if prev.mark_synced().is_some() {
                debug!(
                    target: LOG_TARGET,
                    "Chunk {} enqueued again. Slot {} is superseded by {}",
                    item.address().short_str(),
                    prev.key(),
                    key
                );
                batch.delete_entry(*prev.address(), prev.key());
                self.size = self.size.saturating_sub(1);
            }
        }
        batch.set_size(self.size);
        trace!(
            target: LOG_TARGET,
            "Enqueued chunk {} at {}",
            item.address().short_str(),
            key
        );
        Ok(item)
    }

    /// Mark the indexed item for `address` as synced and stage the delete of its slot. Returns the item and its
    /// previous state, or None if the address is unknown or already synced.
    pub fn mark_synced(&mut self, batch: &mut StoreBatch, address: &Address) -> Option<(Arc<PushItem>, ChunkState)> {
        let item = self.db.index.get(address)?;
        let prev = item.mark_synced()?;
        batch.delete_entry(*address, item.key());
        self.size = self.size.saturating_sub(1);
        batch.set_size(self.size);
        trace!(
            target: LOG_TARGET,
            "Chunk {} at {} synced",
            address.short_str(),
            item.key()
        );
        Some((item, prev))
    }

    /// Write `batch` to the backend. See [QueueDb::commit].
    pub fn commit(&self, batch: StoreBatch) -> Result<(), QueueError> {
        self.db.commit(batch)
    }

    pub fn scan(&self, from_seq: u64, max_count: usize) -> Result<ScanResult, QueueError> {
        self.db.scan(from_seq, max_count)
    }

    /// The persisted number of entries
    pub fn size(&self) -> Result<u64, QueueError> {
        self.db.read_size()
    }

    /// The number of entries including mutations that have been staged but not committed
    pub fn pending_size(&self) -> u64 {
        self.size
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn index(&self) -> &WaitingIndex {
        &self.db.index
    }

    pub fn db(&self) -> QueueDb<B> {
        self.db.clone()
    }

    /// Commit the remaining staged mutations and close the queue
    pub fn close(self, batch: StoreBatch) -> Result<(), QueueError> {
        if !batch.is_empty() {
            self.db.commit(batch)?;
        }
        info!(target: LOG_TARGET, "Push queue closed with {} entries", self.size);
        Ok(())
    }
}

/// Shared access to the queue backend and waiting index
pub struct QueueDb<B> {
    backend: Arc<B>,
    index: WaitingIndex,
}

impl<B> Clone for QueueDb<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            index: self.index.clone(),
        }
    }
}

impl<B: KeyValueStore + 'static> QueueDb<B> {
    /// Write `batch` atomically, then remove the addresses it deleted from the waiting index
    pub fn commit(&self, batch: StoreBatch) -> Result<(), QueueError> {
        let (writes, deleted) = batch.into_parts();
        let num_ops = writes.len();
        self.backend.write(writes)?;
        for (address, key) in deleted {
            self.index.remove_if_key(&address, key);
        }
        debug!(target: LOG_TARGET, "Committed queue batch of {} operation(s)", num_ops);
        Ok(())
    }

    /// Read up to `max_count` entries in sequence order, starting at `from_seq`
    pub fn scan(&self, from_seq: u64, max_count: usize) -> Result<ScanResult, QueueError> {
        let mut entries = Vec::new();
        let mut next_seq = from_seq;
        if max_count == 0 {
            return Ok((entries, next_seq));
        }

        let mut error = None;
        self.backend
            .for_each_from(&QueueKey::new(from_seq).to_bytes(), |key, value| {
                if key.first() != Some(&ENTRY_PREFIX) {
                    return IterationResult::Break;
                }
                match decode_entry(key, value) {
                    Ok((key, entry)) => {
                        next_seq = key.seq().saturating_add(1);
                        entries.push((key, entry));
                        if entries.len() >= max_count {
                            IterationResult::Break
                        } else {
                            IterationResult::Continue
                        }
                    },
                    Err(err) => {
                        error = Some(err);
                        IterationResult::Break
                    },
                }
            })?;
        if let Some(err) = error {
            return Err(err);
        }
        trace!(
            target: LOG_TARGET,
            "Scanned {} entries from #{} (next = #{})",
            entries.len(),
            from_seq,
            next_seq
        );
        Ok((entries, next_seq))
    }

    pub fn read_size(&self) -> Result<u64, QueueError> {
        self.read_counter(&SIZE_KEY)
    }

    pub fn read_last_seq(&self) -> Result<u64, QueueError> {
        self.read_counter(&LAST_SEQ_KEY)
    }

    pub fn index(&self) -> &WaitingIndex {
        &self.index
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64, QueueError> {
        match self.backend.get(key)? {
            Some(bytes) => {
                let buf: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    QueueError::Deserialization(format!(
                        "counter at key {} has {} bytes, expected 8",
                        hex::encode(key),
                        bytes.len()
                    ))
                })?;
                Ok(u64::from_be_bytes(buf))
            },
            None => Ok(0),
        }
    }
}

fn decode_entry(key: &[u8], value: &[u8]) -> Result<(QueueKey, QueueEntry), QueueError> {
    let key = QueueKey::from_bytes(key)?;
    let entry = bincode::deserialize(value).map_err(|e| QueueError::Deserialization(e.to_string()))?;
    Ok((key, entry))
}

#[cfg(test)]
mod test {
    use tari_storage::{
        lmdb_store::{db, LMDBBuilder},
        BTreeMapDatabase,
    };

    use super::*;

    fn address(n: u64) -> Address {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_be_bytes());
        Address::new(bytes)
    }

    fn entry(n: u64) -> QueueEntry {
        QueueEntry::new(address(n), "t", 0)
    }

    fn enqueue_all<B: KeyValueStore + 'static>(queue: &mut PersistentQueue<B>, range: std::ops::RangeInclusive<u64>) {
        let mut batch = StoreBatch::new();
        for n in range {
            queue.enqueue(&mut batch, entry(n)).unwrap();
        }
        queue.commit(batch).unwrap();
    }

    fn scanned_addresses<B: KeyValueStore + 'static>(queue: &PersistentQueue<B>, max: usize) -> Vec<Address> {
        let (entries, _) = queue.scan(0, max).unwrap();
        entries.into_iter().map(|(_, e)| e.address).collect()
    }

    #[test]
    fn enqueued_entries_are_scanned_in_order() {
        let mut queue = PersistentQueue::open(BTreeMapDatabase::new()).unwrap();
        enqueue_all(&mut queue, 1..=20);
        assert_eq!(queue.size().unwrap(), 20);
        let expected = (1..=20).map(address).collect::<Vec<_>>();
        assert_eq!(scanned_addresses(&queue, 20), expected);
        assert_eq!(queue.index().len(), 20);
    }

    #[test]
    fn scan_is_bounded_and_returns_next_seq() {
        let mut queue = PersistentQueue::open(BTreeMapDatabase::new()).unwrap();
        enqueue_all(&mut queue, 1..=5);
        let (entries, next) = queue.scan(0, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(next, entries[1].0.seq() + 1);

        let (entries, next2) = queue.scan(next, 10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1.address, address(3));
        assert_eq!(next2, queue.last_seq() + 1);

        let (entries, next3) = queue.scan(next2, 10).unwrap();
        assert!(entries.is_empty());
        assert_eq!(next3, next2);
    }

    #[test]
    fn mark_synced_deletes_entries() {
        let mut queue = PersistentQueue::open(BTreeMapDatabase::new()).unwrap();
        enqueue_all(&mut queue, 1..=3);

        let mut batch = StoreBatch::new();
        let (item, prev) = queue.mark_synced(&mut batch, &address(2)).unwrap();
        assert_eq!(prev, ChunkState::Stored);
        assert_eq!(item.state(), ChunkState::Synced);
        // Idempotent
        assert!(queue.mark_synced(&mut batch, &address(2)).is_none());
        // Unknown
        assert!(queue.mark_synced(&mut batch, &address(99)).is_none());
        // Not removed from the index until the delete is durable
        assert!(queue.index().get(&address(2)).is_some());
        queue.commit(batch).unwrap();

        assert!(queue.index().get(&address(2)).is_none());
        assert_eq!(queue.size().unwrap(), 2);
        assert_eq!(scanned_addresses(&queue, 10), vec![address(1), address(3)]);
    }

    #[test]
    fn enqueue_and_sync_in_one_batch() {
        let mut queue = PersistentQueue::open(BTreeMapDatabase::new()).unwrap();
        let mut batch = StoreBatch::new();
        queue.enqueue(&mut batch, entry(1)).unwrap();
        queue.mark_synced(&mut batch, &address(1)).unwrap();
        assert_eq!(batch.num_enqueued(), 1);
        queue.commit(batch).unwrap();
        assert_eq!(queue.size().unwrap(), 0);
        assert!(queue.index().is_empty());
        assert!(scanned_addresses(&queue, 10).is_empty());
    }

    #[test]
    fn duplicate_enqueue_supersedes_earlier_slot() {
        let mut queue = PersistentQueue::open(BTreeMapDatabase::new()).unwrap();
        enqueue_all(&mut queue, 1..=2);
        let mut batch = StoreBatch::new();
        let item = queue.enqueue(&mut batch, entry(1)).unwrap();
        queue.commit(batch).unwrap();

        assert_eq!(queue.size().unwrap(), 2);
        assert_eq!(scanned_addresses(&queue, 10), vec![address(2), address(1)]);
        assert!(queue.index().is_current(&item));

        let mut batch = StoreBatch::new();
        queue.mark_synced(&mut batch, &address(1)).unwrap();
        queue.mark_synced(&mut batch, &address(2)).unwrap();
        queue.commit(batch).unwrap();
        assert_eq!(queue.size().unwrap(), 0);
    }

    #[test]
    fn sequence_numbers_and_size_survive_reopen() {
        let backend = Arc::new(BTreeMapDatabase::new());
        let mut queue = PersistentQueue::open(backend.clone()).unwrap();
        enqueue_all(&mut queue, 1..=4);
        let last_seq = queue.last_seq();
        // Staged but uncommitted mutations are lost
        let mut batch = StoreBatch::new();
        queue.mark_synced(&mut batch, &address(1)).unwrap();
        drop(queue);

        let mut queue = PersistentQueue::open(backend).unwrap();
        assert_eq!(queue.last_seq(), last_seq);
        assert_eq!(queue.size().unwrap(), 4);
        assert!(queue.index().is_empty());
        let mut batch = StoreBatch::new();
        let item = queue.enqueue(&mut batch, entry(5)).unwrap();
        assert_eq!(item.key().seq(), last_seq + 1);
    }

    #[test]
    fn lmdb_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let open = || {
            let store = LMDBBuilder::new()
                .set_path(dir.path())
                .set_environment_size(10)
                .add_database("queue", db::CREATE)
                .build()
                .unwrap();
            PersistentQueue::open(store.get_handle("queue").unwrap()).unwrap()
        };

        {
            let mut queue = open();
            enqueue_all(&mut queue, 1..=10);
            let mut batch = StoreBatch::new();
            for n in (2..=10).step_by(2) {
                queue.mark_synced(&mut batch, &address(n)).unwrap();
            }
            queue.close(batch).unwrap();
        }

        let queue = open();
        assert_eq!(queue.size().unwrap(), 5);
        assert_eq!(
            scanned_addresses(&queue, 10),
            vec![address(1), address(3), address(5), address(7), address(9)]
        );
    }
}
