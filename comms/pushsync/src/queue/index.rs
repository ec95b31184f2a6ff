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
    sync::{Arc, RwLock},
};

use crate::{
    chunk::Address,
    queue::{PushItem, QueueEntry, QueueKey},
};

/// Maps each outstanding address to the most recently enqueued item for it
#[derive(Clone, Default)]
pub struct WaitingIndex {
    items: Arc<RwLock<HashMap<Address, Arc<PushItem>>>>,
}

impl WaitingIndex {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, address: &Address) -> Option<Arc<PushItem>> {
        acquire_read_lock!(self.items).get(address).cloned()
    }

    /// Index `item`, returning the item it replaced
    pub fn insert(&self, item: Arc<PushItem>) -> Option<Arc<PushItem>> {
        acquire_write_lock!(self.items).insert(*item.address(), item)
    }

    /// Remove the indexed item for `address` only if it occupies the slot `key`. A newer item for the same address is
    /// left in place.
    pub fn remove_if_key(&self, address: &Address, key: QueueKey) -> bool {
        let mut items = acquire_write_lock!(self.items);
        match items.get(address) {
            Some(item) if item.key() == key => {
                items.remove(address);
                true
            },
            _ => false,
        }
    }

    /// Resolve an entry read from disk to its indexed item. An existing item for the same slot is reused so that its
    /// dispatch state is kept. Entries in a slot that has been superseded by a newer enqueue return None.
    pub fn index_scanned(&self, key: QueueKey, entry: QueueEntry) -> Option<Arc<PushItem>> {
        let mut items = acquire_write_lock!(self.items);
        match items.get(&entry.address) {
            Some(item) if item.key() == key => Some(item.clone()),
            Some(item) if item.key() > key => None,
            _ => {
                let item = Arc::new(PushItem::new(key, entry));
                items.insert(*item.address(), item.clone());
                Some(item)
            },
        }
    }

    /// Returns true if `item` is the indexed item for its address
    pub fn is_current(&self, item: &Arc<PushItem>) -> bool {
        acquire_read_lock!(self.items)
            .get(item.address())
            .map(|indexed| Arc::ptr_eq(indexed, item))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        acquire_read_lock!(self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tags::ChunkState;

    fn entry(n: u8) -> QueueEntry {
        QueueEntry::new(Address::new([n; 32]), "t", 0)
    }

    #[test]
    fn scanned_entries_reuse_indexed_items() {
        let index = WaitingIndex::new();
        let item = index.index_scanned(QueueKey::new(1), entry(1)).unwrap();
        item.mark_synced();
        let again = index.index_scanned(QueueKey::new(1), entry(1)).unwrap();
        assert!(Arc::ptr_eq(&item, &again));
        assert_eq!(again.state(), ChunkState::Synced);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn superseded_slots_are_not_indexed() {
        let index = WaitingIndex::new();
        let newer = Arc::new(PushItem::new(QueueKey::new(5), entry(1)));
        index.insert(newer.clone());
        assert!(index.index_scanned(QueueKey::new(2), entry(1)).is_none());
        assert!(index.is_current(&newer));
    }

    #[test]
    fn remove_if_key_keeps_newer_items() {
        let index = WaitingIndex::new();
        let old = Arc::new(PushItem::new(QueueKey::new(1), entry(1)));
        let new = Arc::new(PushItem::new(QueueKey::new(2), entry(1)));
        index.insert(old.clone());
        assert!(Arc::ptr_eq(&index.insert(new.clone()).unwrap(), &old));
        assert!(!index.is_current(&old));
        assert!(!index.remove_if_key(old.address(), old.key()));
        assert!(index.remove_if_key(new.address(), new.key()));
        assert!(index.is_empty());
    }
}
