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
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    chunk::{Address, Chunk},
    queue::QueueKey,
    tags::ChunkState,
};

/// The durable record of an outstanding push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub address: Address,
    pub tag: String,
    pub proximity_order: u16,
}

impl QueueEntry {
    pub fn new<T: Into<String>>(address: Address, tag: T, proximity_order: u16) -> Self {
        Self {
            address,
            tag: tag.into(),
            proximity_order,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DispatchState {
    state: ChunkState,
    last_sent_at: Option<Instant>,
}

/// A queue entry together with its slot and dispatch state
pub struct PushItem {
    key: QueueKey,
    entry: QueueEntry,
    state: Mutex<DispatchState>,
}

impl PushItem {
    pub fn new(key: QueueKey, entry: QueueEntry) -> Self {
        Self {
            key,
            entry,
            state: Mutex::new(DispatchState {
                state: ChunkState::Stored,
                last_sent_at: None,
            }),
        }
    }

    pub fn key(&self) -> QueueKey {
        self.key
    }

    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    pub fn address(&self) -> &Address {
        &self.entry.address
    }

    pub fn tag(&self) -> &str {
        &self.entry.tag
    }

    pub fn state(&self) -> ChunkState {
        acquire_lock!(self.state).state
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        acquire_lock!(self.state).last_sent_at
    }

    /// Returns true if the item should be dispatched at `now`
    pub fn is_due(&self, now: Instant, retry_interval: Duration) -> bool {
        let state = acquire_lock!(self.state);
        is_due(&state, now, retry_interval)
    }

    /// Transition to SENT if the item is due at `now`. Returns the previous state if the transition happened.
    pub fn mark_sent_if_due(&self, now: Instant, retry_interval: Duration) -> Option<ChunkState> {
        let mut state = acquire_lock!(self.state);
        if !is_due(&state, now, retry_interval) {
            return None;
        }
        let prev = state.state;
        state.state = ChunkState::Sent;
        state.last_sent_at = Some(now);
        Some(prev)
    }

    /// Transition to SYNCED. Returns the previous state, or None if the item was already synced.
    pub fn mark_synced(&self) -> Option<ChunkState> {
        let mut state = acquire_lock!(self.state);
        if state.state == ChunkState::Synced {
            return None;
        }
        let prev = state.state;
        state.state = ChunkState::Synced;
        Some(prev)
    }
}

fn is_due(state: &DispatchState, now: Instant, retry_interval: Duration) -> bool {
    match state.state {
        ChunkState::Synced => false,
        ChunkState::Sent => state
            .last_sent_at
            .map(|t| now.saturating_duration_since(t) >= retry_interval)
            .unwrap_or(true),
        _ => true,
    }
}

impl fmt::Debug for PushItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushItem")
            .field("key", &self.key)
            .field("address", &self.entry.address)
            .field("tag", &self.entry.tag)
            .field("state", &self.state())
            .finish()
    }
}

/// An item loaded with its chunk payload, waiting to be dispatched. The payload is released once the chunk is sent.
#[derive(Debug)]
pub struct PendingPush {
    item: Arc<PushItem>,
    payload: Option<Bytes>,
}

impl PendingPush {
    pub fn new(item: Arc<PushItem>, payload: Bytes) -> Self {
        Self {
            item,
            payload: Some(payload),
        }
    }

    pub fn item(&self) -> &Arc<PushItem> {
        &self.item
    }

    /// Take the payload as a chunk. Returns None if it has already been taken.
    pub fn take_chunk(&mut self) -> Option<Chunk> {
        let address = *self.item.address();
        self.payload.take().map(|data| Chunk::new(address, data))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn item() -> PushItem {
        PushItem::new(QueueKey::new(1), QueueEntry::new(Address::new([1; 32]), "t", 3))
    }

    #[test]
    fn entry_serialization_only_holds_durable_fields() {
        let entry = QueueEntry::new(Address::new([7; 32]), "tag", 12);
        let bytes = bincode::serialize(&entry).unwrap();
        // 32 address bytes, an 8 byte string length, the string and the u16 proximity order
        assert_eq!(bytes.len(), 32 + 8 + 3 + 2);
        assert_eq!(bincode::deserialize::<QueueEntry>(&bytes).unwrap(), entry);
    }

    #[test]
    fn new_items_are_due() {
        let item = item();
        assert_eq!(item.state(), ChunkState::Stored);
        assert!(item.is_due(Instant::now(), Duration::from_secs(1)));
    }

    #[test]
    fn retry_interval_is_enforced() {
        let item = item();
        let retry = Duration::from_millis(100);
        let now = Instant::now();
        assert_eq!(item.mark_sent_if_due(now, retry), Some(ChunkState::Stored));
        assert_eq!(item.last_sent_at(), Some(now));
        assert!(item.mark_sent_if_due(now + Duration::from_millis(99), retry).is_none());
        assert_eq!(
            item.mark_sent_if_due(now + Duration::from_millis(100), retry),
            Some(ChunkState::Sent)
        );
    }

    #[test]
    fn synced_is_terminal() {
        let item = item();
        assert_eq!(item.mark_synced(), Some(ChunkState::Stored));
        assert!(item.mark_synced().is_none());
        assert!(item.mark_sent_if_due(Instant::now(), Duration::ZERO).is_none());
        assert_eq!(item.state(), ChunkState::Synced);
    }

    #[test]
    fn payload_is_released_after_take() {
        let mut pending = PendingPush::new(Arc::new(item()), Bytes::from_static(b"abc"));
        let chunk = pending.take_chunk().unwrap();
        assert_eq!(chunk.data().as_ref(), b"abc");
        assert!(pending.take_chunk().is_none());
    }
}
