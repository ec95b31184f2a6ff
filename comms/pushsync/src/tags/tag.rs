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
    convert::TryFrom,
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        RwLock,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch, Mutex},
    time,
    time::Instant,
};

use crate::{
    chunk::Address,
    tags::{ChunkState, TagError},
};

const LOG_TARGET: &str = "comms::pushsync::tags";

/// The number of completion signals that are buffered for consumers
const COMPLETION_BUFFER_SIZE: usize = 5;
/// How often `wait_until` logs progress
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Progress counters for a logical batch of chunks
pub struct Tag {
    uid: u32,
    name: String,
    address: RwLock<Option<Address>>,
    total: AtomicU64,
    split: AtomicU64,
    stored: AtomicU64,
    seen: AtomicU64,
    sent: AtomicU64,
    synced: AtomicU64,
    started_at: DateTime<Utc>,
    // One bit per ChunkState, set once the completion signal for that state has been published
    signalled: AtomicU8,
    completion_tx: mpsc::Sender<ChunkState>,
    completion_rx: Mutex<mpsc::Receiver<ChunkState>>,
    // Wakes every `wait_until` caller whenever a state completes
    signalled_tx: watch::Sender<u8>,
    signalled_rx: watch::Receiver<u8>,
}

impl Tag {
    pub fn new<T: Into<String>>(uid: u32, name: T, total: u64) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_BUFFER_SIZE);
        let (signalled_tx, signalled_rx) = watch::channel(0);
        Self {
            uid,
            name: name.into(),
            address: RwLock::new(None),
            total: AtomicU64::new(total),
            split: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            seen: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            started_at: Utc::now(),
            signalled: AtomicU8::new(0),
            completion_tx,
            completion_rx: Mutex::new(completion_rx),
            signalled_tx,
            signalled_rx,
        }
    }

    /// Reconstruct a tag from a snapshot. Completion signals for states that were already complete are not
    /// published again.
    pub fn from_snapshot(snapshot: TagSnapshot) -> Self {
        let mut tag = Self::new(snapshot.uid, snapshot.name, snapshot.total);
        *tag.address.get_mut().unwrap_or_else(|e| e.into_inner()) = snapshot.address;
        tag.split = AtomicU64::new(snapshot.split);
        tag.stored = AtomicU64::new(snapshot.stored);
        tag.seen = AtomicU64::new(snapshot.seen);
        tag.sent = AtomicU64::new(snapshot.sent);
        tag.synced = AtomicU64::new(snapshot.synced);
        tag.started_at = snapshot.started_at;
        let signalled = ChunkState::ALL
            .iter()
            .filter(|s| tag.is_complete(**s))
            .fold(0u8, |bits, s| bits | s.as_bit());
        tag.signalled = AtomicU8::new(signalled);
        tag
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root address of the content, if known
    pub fn address(&self) -> Option<Address> {
        *acquire_read_lock!(self.address)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn counter(&self, state: ChunkState) -> &AtomicU64 {
        use ChunkState::*;
        match state {
            Split => &self.split,
            Stored => &self.stored,
            Seen => &self.seen,
            Sent => &self.sent,
            Synced => &self.synced,
        }
    }

    /// Increment the counter for `state`. The completion signal is published when the counter reaches its expected
    /// total.
    pub fn inc(&self, state: ChunkState) {
        let count = self.counter(state).fetch_add(1, Ordering::SeqCst) + 1;
        self.signal_if_complete(state, count);
        if state == ChunkState::Seen {
            // SEEN lowers the expected SENT and SYNCED counts, which may complete them
            for state in [ChunkState::Sent, ChunkState::Synced] {
                self.signal_if_complete(state, self.get(state));
            }
        }
    }

    pub fn get(&self, state: ChunkState) -> u64 {
        self.counter(state).load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// The count that `state` has to reach for the tag to be complete in that state. Chunks that were already present
    /// locally are never sent, so they are excluded for SENT and SYNCED.
    fn expected(&self, state: ChunkState) -> u64 {
        let total = self.total();
        match state {
            ChunkState::Sent | ChunkState::Synced => total.saturating_sub(self.get(ChunkState::Seen)),
            _ => total,
        }
    }

    /// Returns `(count, expected total)` for `state`
    pub fn status(&self, state: ChunkState) -> (u64, u64) {
        (self.get(state), self.expected(state))
    }

    pub fn is_complete(&self, state: ChunkState) -> bool {
        let (count, expected) = self.status(state);
        expected > 0 && count >= expected
    }

    /// Returns true once every chunk has been stored and synced
    pub fn done_syncing(&self) -> bool {
        let total = self.total();
        total > 0 && self.get(ChunkState::Stored) >= total && self.is_complete(ChunkState::Synced)
    }

    /// Copy the SPLIT count into the total. Used when the number of chunks is not known up front.
    pub fn set_total(&self) -> u64 {
        let total = self.get(ChunkState::Split);
        self.total.store(total, Ordering::SeqCst);
        for state in ChunkState::ALL {
            self.signal_if_complete(state, self.get(state));
        }
        total
    }

    /// Record the root address of the content and set the total to the SPLIT count
    pub fn done_split(&self, address: Address) -> u64 {
        *acquire_write_lock!(self.address) = Some(address);
        self.set_total()
    }

    fn signal_if_complete(&self, state: ChunkState, count: u64) {
        let expected = self.expected(state);
        if expected == 0 || count < expected {
            return;
        }
        let bit = state.as_bit();
        let previous = self.signalled.fetch_or(bit, Ordering::SeqCst);
        if previous & bit != 0 {
            return;
        }
        debug!(target: LOG_TARGET, "Tag '{}' is complete for state {}", self.name, state);
        let _ = self.signalled_tx.send(self.signalled.load(Ordering::SeqCst));
        if self.completion_tx.try_send(state).is_err() {
            debug!(
                target: LOG_TARGET,
                "Completion signal buffer for tag '{}' is full. Signal for {} dropped", self.name, state
            );
        }
    }

    /// Estimate the completion time for `state` from the rate of progress so far
    pub fn eta(&self, state: ChunkState) -> Result<DateTime<Utc>, TagError> {
        let (count, total) = self.status(state);
        if count == 0 || total == 0 {
            return Err(TagError::NoEta(state));
        }
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u128;
        let estimate_ms = elapsed_ms * u128::from(total) / u128::from(count);
        let estimate_ms = i64::try_from(estimate_ms).map_err(|_| TagError::NoEta(state))?;
        Ok(self.started_at + chrono::Duration::milliseconds(estimate_ms))
    }

    /// Wait for the next completion signal
    pub async fn next_completion(&self) -> Option<ChunkState> {
        self.completion_rx.lock().await.recv().await
    }

    /// Returns the next buffered completion signal, if any
    pub fn try_next_completion(&self) -> Option<ChunkState> {
        self.completion_rx.try_lock().ok()?.try_recv().ok()
    }

    fn is_signalled(&self, state: ChunkState) -> bool {
        self.signalled.load(Ordering::SeqCst) & state.as_bit() != 0
    }

    /// Wait until the tag is complete in `state`, or until `deadline`. Any number of callers may wait concurrently.
    /// Waiting does not consume the signals returned by [Tag::next_completion].
    pub async fn wait_until(&self, state: ChunkState, deadline: Instant) -> Result<(), TagError> {
        let mut signalled_rx = self.signalled_rx.clone();
        let mut log_ticker = time::interval_at(Instant::now() + WAIT_LOG_INTERVAL, WAIT_LOG_INTERVAL);
        let deadline = time::sleep_until(deadline);
        tokio::pin!(deadline);

        loop {
            if self.is_signalled(state) || self.is_complete(state) {
                return Ok(());
            }

            tokio::select! {
                _ = &mut deadline => {
                    if self.is_complete(state) {
                        return Ok(());
                    }
                    return Err(TagError::Deadline(state));
                },
                // The sender lives as long as the tag, so this never returns an error
                _ = signalled_rx.changed() => {},
                _ = log_ticker.tick() => {
                    let (count, total) = self.status(state);
                    info!(
                        target: LOG_TARGET,
                        "Tag '{}': waiting for {} ({}/{})", self.name, state, count, total
                    );
                },
            }
        }
    }

    pub fn snapshot(&self) -> TagSnapshot {
        TagSnapshot {
            uid: self.uid,
            name: self.name.clone(),
            address: self.address(),
            total: self.total(),
            split: self.get(ChunkState::Split),
            stored: self.get(ChunkState::Stored),
            seen: self.get(ChunkState::Seen),
            sent: self.get(ChunkState::Sent),
            synced: self.get(ChunkState::Synced),
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("total", &self.total())
            .field("split", &self.get(ChunkState::Split))
            .field("stored", &self.get(ChunkState::Stored))
            .field("seen", &self.get(ChunkState::Seen))
            .field("sent", &self.get(ChunkState::Sent))
            .field("synced", &self.get(ChunkState::Synced))
            .finish()
    }
}

/// A point-in-time copy of a tag's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSnapshot {
    pub uid: u32,
    pub name: String,
    pub address: Option<Address>,
    pub total: u64,
    pub split: u64,
    pub stored: u64,
    pub seen: u64,
    pub sent: u64,
    pub synced: u64,
    pub started_at: DateTime<Utc>,
}

impl TagSnapshot {
    pub fn to_binary(&self) -> Result<Vec<u8>, TagError> {
        bincode::serialize(self).map_err(|e| TagError::Decode(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, TagError> {
        bincode::deserialize(bytes).map_err(|e| TagError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inc_and_status() {
        let tag = Tag::new(1, "t", 3);
        tag.inc(ChunkState::Split);
        tag.inc(ChunkState::Split);
        assert_eq!(tag.get(ChunkState::Split), 2);
        assert_eq!(tag.status(ChunkState::Split), (2, 3));
        assert_eq!(tag.status(ChunkState::Synced), (0, 3));
    }

    #[test]
    fn completion_signal_is_published_once() {
        let tag = Tag::new(1, "t", 2);
        tag.inc(ChunkState::Stored);
        assert!(tag.try_next_completion().is_none());
        tag.inc(ChunkState::Stored);
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Stored));
        tag.inc(ChunkState::Stored);
        assert!(tag.try_next_completion().is_none());
    }

    #[test]
    fn set_total_copies_split_and_signals_completed_states() {
        let tag = Tag::new(1, "t", 0);
        for _ in 0..4 {
            tag.inc(ChunkState::Split);
            tag.inc(ChunkState::Stored);
        }
        assert!(tag.try_next_completion().is_none());
        assert_eq!(tag.set_total(), 4);
        assert_eq!(tag.total(), 4);
        let mut signals = vec![tag.try_next_completion().unwrap(), tag.try_next_completion().unwrap()];
        signals.sort();
        assert_eq!(signals, vec![ChunkState::Split, ChunkState::Stored]);
    }

    #[test]
    fn done_split_records_address() {
        let tag = Tag::new(1, "t", 0);
        tag.inc(ChunkState::Split);
        let address = Address::new([9; 32]);
        assert_eq!(tag.done_split(address), 1);
        assert_eq!(tag.address(), Some(address));
    }

    #[test]
    fn seen_chunks_are_excluded_from_sync_totals() {
        let tag = Tag::new(1, "t", 3);
        for _ in 0..3 {
            tag.inc(ChunkState::Split);
            tag.inc(ChunkState::Stored);
        }
        tag.inc(ChunkState::Seen);
        assert_eq!(tag.status(ChunkState::Synced), (0, 2));
        tag.inc(ChunkState::Sent);
        tag.inc(ChunkState::Synced);
        tag.inc(ChunkState::Sent);
        tag.inc(ChunkState::Synced);
        assert!(tag.is_complete(ChunkState::Synced));
        assert!(tag.done_syncing());
    }

    #[test]
    fn seen_chunk_counted_last_completes_sync() {
        let tag = Tag::new(1, "t", 2);
        for _ in 0..2 {
            tag.inc(ChunkState::Split);
            tag.inc(ChunkState::Stored);
        }
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Split));
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Stored));
        tag.inc(ChunkState::Sent);
        tag.inc(ChunkState::Synced);
        assert!(tag.try_next_completion().is_none());

        tag.inc(ChunkState::Seen);
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Sent));
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Synced));
        assert!(tag.try_next_completion().is_none());
        assert!(tag.done_syncing());
    }

    #[tokio::test]
    async fn concurrent_waiters_are_all_woken() {
        let tag = std::sync::Arc::new(Tag::new(1, "t", 1));
        let waiters = (0..3)
            .map(|_| {
                let tag = tag.clone();
                tokio::spawn(async move {
                    tag.wait_until(ChunkState::Synced, Instant::now() + Duration::from_secs(5))
                        .await
                })
            })
            .collect::<Vec<_>>();
        time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        tag.inc(ChunkState::Sent);
        tag.inc(ChunkState::Synced);
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        // Waiters leave the completion signals for other consumers
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Sent));
        assert_eq!(tag.try_next_completion(), Some(ChunkState::Synced));
    }

    #[test]
    fn eta_requires_progress() {
        let tag = Tag::new(1, "t", 10);
        assert!(matches!(tag.eta(ChunkState::Split), Err(TagError::NoEta(ChunkState::Split))));
        let tag = Tag::new(1, "t", 0);
        tag.inc(ChunkState::Split);
        assert!(matches!(tag.eta(ChunkState::Split), Err(TagError::NoEta(_))));
    }

    #[test]
    fn eta_is_not_before_start() {
        let tag = Tag::new(1, "t", 10);
        for _ in 0..5 {
            tag.inc(ChunkState::Split);
        }
        let eta = tag.eta(ChunkState::Split).unwrap();
        assert!(eta >= tag.started_at());
    }

    #[tokio::test]
    async fn wait_until_returns_when_complete() {
        let tag = std::sync::Arc::new(Tag::new(1, "t", 2));
        let waiter = {
            let tag = tag.clone();
            tokio::spawn(async move {
                tag.wait_until(ChunkState::Synced, Instant::now() + Duration::from_secs(5))
                    .await
            })
        };
        tag.inc(ChunkState::Synced);
        tag.inc(ChunkState::Synced);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_until_deadline() {
        let tag = Tag::new(1, "t", 2);
        tag.inc(ChunkState::Synced);
        let err = tag
            .wait_until(ChunkState::Synced, Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::Deadline(ChunkState::Synced)));
    }

    #[test]
    fn snapshot_round_trip() {
        let tag = Tag::new(42, "upload", 2);
        tag.inc(ChunkState::Split);
        tag.inc(ChunkState::Split);
        tag.done_split(Address::new([3; 32]));
        let snapshot = tag.snapshot();
        let decoded = TagSnapshot::from_binary(&snapshot.to_binary().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let restored = Tag::from_snapshot(decoded);
        assert_eq!(restored.uid(), 42);
        assert_eq!(restored.get(ChunkState::Split), 2);
        assert_eq!(restored.address(), Some(Address::new([3; 32])));
        // SPLIT was already complete so it is not signalled again
        assert!(restored.try_next_completion().is_none());
    }
}
