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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::*;
use tari_storage::KeyValueStore;
use thiserror::Error;
use tokio::{sync::mpsc, time};

use crate::{
    chunk::{proximity, Address, Chunk},
    chunk_store::{ChunkStore, ChunkStoreError, PutOutcome},
    config::PushSyncConfig,
    overlay::Overlay,
    protocol::{Dispatcher, ProtocolError, Storer},
    pubsub::PubSub,
    queue::{PersistentQueue, QueueEntry, QueueError},
    scheduler::{Scheduler, SchedulerError, SchedulerHandle},
    tags::{ChunkState, Tag, TagError, Tags},
};

const LOG_TARGET: &str = "comms::pushsync::pusher";

#[derive(Debug, Error)]
pub enum PushSyncError {
    #[error("Push-sync has been closed")]
    Closed,
    #[error("Tag '{0}' not found")]
    TagNotFound(String),
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),
    #[error("Chunk store error: {0}")]
    ChunkStore(#[from] ChunkStoreError),
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Push queue error: {0}")]
    Queue(#[from] QueueError),
}

/// The push-sync service. Chunks `put` here are stored locally and pushed to their neighbourhood until a receipt
/// arrives for each of them.
pub struct Pusher {
    config: PushSyncConfig,
    base_address: Address,
    tags: Arc<Tags>,
    chunk_store: Arc<dyn ChunkStore>,
    dispatcher: Arc<Dispatcher>,
    storer: Storer,
    scheduler: SchedulerHandle,
    is_closed: AtomicBool,
}

impl Pusher {
    /// Open the push queue in `backend`, register the protocol handlers and start the scheduler. Entries left in the
    /// queue by a previous run are dispatched again.
    pub fn new<B: KeyValueStore + 'static>(
        config: PushSyncConfig,
        backend: B,
        chunk_store: Arc<dyn ChunkStore>,
        pubsub: Arc<dyn PubSub>,
        overlay: Arc<dyn Overlay>,
        tags: Arc<Tags>,
    ) -> Result<Self, PushSyncError> {
        let base_address = pubsub.base_address();
        let (receipt_tx, receipt_rx) = mpsc::channel(config.receipt_buffer_size.max(1));

        let dispatcher = Arc::new(Dispatcher::new(pubsub.clone(), receipt_tx.clone())?);
        let storer = Storer::spawn(
            &config,
            pubsub,
            chunk_store.clone(),
            overlay.clone(),
            receipt_tx.clone(),
        )?;
        let queue = PersistentQueue::open(backend)?;
        info!(
            target: LOG_TARGET,
            "Starting push-sync for {} with {} queued chunk(s) at neighbourhood depth {}",
            base_address,
            queue.pending_size(),
            overlay.depth()
        );

        let scheduler = Scheduler::new(
            config.clone(),
            queue,
            tags.clone(),
            chunk_store.clone(),
            dispatcher.clone(),
            overlay.subscribe_depth(),
            receipt_tx,
            receipt_rx,
        )
        .spawn();

        Ok(Self {
            config,
            base_address,
            tags,
            chunk_store,
            dispatcher,
            storer,
            scheduler,
            is_closed: AtomicBool::new(false),
        })
    }

    /// Store `chunk` and queue it for push-sync under the tag named `tag`. A chunk that is already in the local store
    /// is counted as SEEN and not queued again. Progress for a tag that has not been created is not tracked, but the
    /// chunk is still stored and pushed.
    pub async fn put(&self, tag: &str, chunk: Chunk) -> Result<(), PushSyncError> {
        if self.is_closed() {
            return Err(PushSyncError::Closed);
        }

        let address = *chunk.address();
        let outcome = self.chunk_store.put(chunk).await?;
        self.tags.inc(tag, ChunkState::Split);
        self.tags.inc(tag, ChunkState::Stored);
        if outcome == PutOutcome::AlreadyExists {
            trace!(target: LOG_TARGET, "Chunk {} has already been stored", address.short_str());
            self.tags.inc(tag, ChunkState::Seen);
            return Ok(());
        }

        let entry = QueueEntry::new(address, tag, proximity(&self.base_address, &address));
        self.scheduler.enqueue(entry).await.map_err(|err| match err {
            SchedulerError::Closed => PushSyncError::Closed,
            err => err.into(),
        })
    }

    pub fn new_tag(&self, name: &str, total: u64) -> Result<Arc<Tag>, PushSyncError> {
        Ok(self.tags.create(name, total)?)
    }

    /// Returns `(count, expected)` for `state` on the named tag
    pub fn status(&self, tag: &str, state: ChunkState) -> Result<(u64, u64), PushSyncError> {
        self.tags
            .get(tag)
            .map(|tag| tag.status(state))
            .ok_or_else(|| PushSyncError::TagNotFound(tag.to_string()))
    }

    pub fn tags(&self) -> &Arc<Tags> {
        &self.tags
    }

    pub fn base_address(&self) -> &Address {
        &self.base_address
    }

    /// The number of chunks in the persisted push queue
    pub async fn queue_size(&self) -> Result<u64, PushSyncError> {
        Ok(self.scheduler.queue_size().await?)
    }

    /// Resolves once every chunk put before this call has been written to the push queue
    pub async fn flush(&self) -> Result<(), PushSyncError> {
        Ok(self.scheduler.flush().await?)
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    /// Stop accepting chunks, deregister the protocol handlers and drain the push queue to disk
    pub async fn close(&self) -> Result<(), PushSyncError> {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return Err(PushSyncError::Closed);
        }
        info!(target: LOG_TARGET, "Closing push-sync");
        self.dispatcher.close();
        self.storer.close().await;

        match time::timeout(self.config.close_timeout, self.scheduler.close()).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(
                    target: LOG_TARGET,
                    "Push-sync scheduler did not stop within {:.2?}", self.config.close_timeout
                );
                Err(PushSyncError::Closed)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures::future;
    use tari_storage::BTreeMapDatabase;
    use tari_test_utils::async_assert_eventually;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        chunk_store::MemoryChunkStore,
        protocol::{
            fresh_nonce,
            ChunkMessage,
            ReceiptMessage,
            WireDecoding,
            WireEncoding,
            TOPIC_CHUNK,
            TOPIC_RECEIPT,
        },
        pubsub::PeerHandle,
        test_utils::{address_with_index, create_pubsub_mock, random_chunk, MockOverlay, MockPubSubState},
    };

    const BASE: Address = Address::new([0xaa; 32]);

    fn setup_with<B: KeyValueStore + 'static>(
        backend: B,
        chunk_store: Arc<MemoryChunkStore>,
    ) -> (Pusher, MockPubSubState) {
        let _ = env_logger::try_init();
        let (pubsub, state) = create_pubsub_mock(BASE);
        let pusher = Pusher::new(
            PushSyncConfig::default_local_test(),
            backend,
            chunk_store,
            pubsub,
            Arc::new(MockOverlay::new(crate::chunk::MAX_PO)),
            Arc::new(Tags::new()),
        )
        .unwrap();
        (pusher, state)
    }

    fn setup() -> (Pusher, MockPubSubState) {
        setup_with(BTreeMapDatabase::new(), Arc::new(MemoryChunkStore::new()))
    }

    /// Deliver every chunk message back to this node, as if it were the only node in the neighbourhood
    fn loopback_chunks(state: &MockPubSubState) {
        let responder = state.clone();
        state.set_on_send(move |sent| {
            if sent.topic == TOPIC_CHUNK {
                responder
                    .deliver(TOPIC_CHUNK, sent.msg.clone(), &PeerHandle::new(BASE))
                    .unwrap();
            }
        });
    }

    #[tokio::test]
    async fn single_chunk_is_synced_on_receipt() {
        let (pusher, state) = setup();
        let tag = pusher.new_tag("t", 1).unwrap();
        let address = address_with_index(1);
        pusher.put("t", random_chunk(address)).await.unwrap();

        let sent = state.await_call_count(1, Duration::from_secs(5)).await;
        let msg = ChunkMessage::from_wire_bytes(&sent[0].msg).unwrap();
        assert_eq!(msg.chunk_address, address);
        assert_eq!(msg.origin, BASE);

        let receipt = ReceiptMessage::new(address, fresh_nonce()).to_wire_bytes().unwrap();
        state
            .deliver(TOPIC_RECEIPT, receipt.into(), &PeerHandle::new(address))
            .unwrap();
        tag.wait_until(ChunkState::Synced, Instant::now() + Duration::from_secs(1))
            .await
            .unwrap();
        pusher.flush().await.unwrap();
        assert_eq!(pusher.queue_size().await.unwrap(), 0);
        assert_eq!(pusher.status("t", ChunkState::Synced).unwrap(), (1, 1));
        assert_eq!(pusher.status("t", ChunkState::Split).unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn concurrent_puts_are_synced_through_the_local_storer() {
        let (pusher, state) = setup();
        loopback_chunks(&state);
        let tag = pusher.new_tag("upload", 20).unwrap();

        let puts = (1..=20).map(|i| pusher.put("upload", random_chunk(address_with_index(i))));
        let results = future::join_all(puts).await;
        assert!(results.iter().all(Result::is_ok));

        tag.wait_until(ChunkState::Synced, Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(tag.get(ChunkState::Sent), 20);
        // The storer answers its own chunks locally
        assert!(state.sent_on(TOPIC_RECEIPT).is_empty());
    }

    #[tokio::test]
    async fn stored_chunks_are_counted_as_seen() {
        let (pusher, _state) = setup();
        let tag = pusher.new_tag("t", 2).unwrap();
        let chunk = random_chunk(address_with_index(1));
        pusher.put("t", chunk.clone()).await.unwrap();
        pusher.put("t", chunk).await.unwrap();

        assert_eq!(tag.get(ChunkState::Split), 2);
        assert_eq!(tag.get(ChunkState::Stored), 2);
        assert_eq!(tag.get(ChunkState::Seen), 1);
        assert_eq!(pusher.status("t", ChunkState::Synced).unwrap(), (0, 1));
        pusher.flush().await.unwrap();
        assert_eq!(pusher.queue_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chunks_with_an_unknown_tag_are_still_pushed() {
        let (pusher, state) = setup();
        let address = address_with_index(1);
        pusher.put("never-created", random_chunk(address)).await.unwrap();
        pusher.flush().await.unwrap();
        assert_eq!(pusher.queue_size().await.unwrap(), 1);
        assert!(pusher.tags().is_empty());

        let sent = state.await_call_count(1, Duration::from_secs(5)).await;
        assert_eq!(sent[0].destination, address);
        let receipt = ReceiptMessage::new(address, fresh_nonce()).to_wire_bytes().unwrap();
        state
            .deliver(TOPIC_RECEIPT, receipt.into(), &PeerHandle::new(address))
            .unwrap();
        async_assert_eventually!(
            {
                pusher.flush().await.unwrap();
                pusher.queue_size().await.unwrap()
            },
            expect = 0
        );
    }

    #[tokio::test]
    async fn unknown_tags_are_reported_by_status() {
        let (pusher, _state) = setup();
        assert!(matches!(
            pusher.status("missing", ChunkState::Synced),
            Err(PushSyncError::TagNotFound(_))
        ));
        pusher.new_tag("t", 1).unwrap();
        assert!(matches!(pusher.new_tag("t", 1), Err(PushSyncError::Tag(TagError::AlreadyExists(_)))));
    }

    #[tokio::test]
    async fn close_deregisters_handlers_and_rejects_puts() {
        let (pusher, state) = setup();
        pusher.new_tag("t", 1).unwrap();
        assert!(state.is_registered(TOPIC_CHUNK));
        assert!(state.is_registered(TOPIC_RECEIPT));

        pusher.close().await.unwrap();
        assert!(pusher.is_closed());
        assert!(!state.is_registered(TOPIC_CHUNK));
        assert!(!state.is_registered(TOPIC_RECEIPT));

        let err = pusher.put("t", random_chunk(address_with_index(1))).await.unwrap_err();
        assert!(matches!(err, PushSyncError::Closed));
        assert!(matches!(pusher.close().await, Err(PushSyncError::Closed)));
    }

    #[tokio::test]
    async fn queued_chunks_are_dispatched_after_restart() {
        let backend = Arc::new(BTreeMapDatabase::new());
        let chunk_store = Arc::new(MemoryChunkStore::new());
        let (pusher, _state) = setup_with(backend.clone(), chunk_store.clone());
        pusher.new_tag("t", 3).unwrap();
        for i in 1..=3 {
            pusher.put("t", random_chunk(address_with_index(i))).await.unwrap();
        }
        pusher.close().await.unwrap();
        drop(pusher);

        let (pusher, state) = setup_with(backend, chunk_store);
        assert_eq!(pusher.queue_size().await.unwrap(), 3);
        let sent = state.await_call_count(3, Duration::from_secs(5)).await;
        let mut destinations = sent.iter().map(|m| m.destination).collect::<Vec<_>>();
        destinations.dedup();
        assert_eq!(destinations[..3], [
            address_with_index(1),
            address_with_index(2),
            address_with_index(3)
        ]);
    }
}
