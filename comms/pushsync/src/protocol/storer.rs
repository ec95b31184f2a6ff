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
    sync::{Arc, Mutex},
    time::Duration,
};

use blake2::{Blake2s256, Digest};
use bytes::Bytes;
use log::*;
use tari_shutdown::{Shutdown, ShutdownSignal};
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError},
    task::JoinHandle,
    time,
    time::MissedTickBehavior,
};

use crate::{
    chunk::{Address, Chunk},
    chunk_store::{ChunkStore, PutOutcome},
    config::PushSyncConfig,
    overlay::Overlay,
    protocol::{
        fresh_nonce,
        ChunkMessage,
        ProtocolError,
        ReceiptMessage,
        WireDecoding,
        WireEncoding,
        TOPIC_CHUNK,
        TOPIC_RECEIPT,
    },
    pubsub::{PeerHandle, PubSub, PubSubError, Registration, TopicHandler},
    ttl_set::TtlSet,
};

const LOG_TARGET: &str = "comms::pushsync::protocol::storer";

type MessageDigest = [u8; 32];

/// Lower bound for the replay cache GC period
const MIN_DEDUP_GC_INTERVAL: Duration = Duration::from_millis(10);

/// The inbound half of the protocol. Stores chunks delivered to this node's neighbourhood and replies to their origin
/// with a receipt, unless a closer peer is known.
pub struct Storer {
    registration: Registration,
    shutdown: Mutex<Shutdown>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Storer {
    /// Register the chunk handler and spawn the storer task. Local receipts, for chunks originating at this node, are
    /// sent to `local_receipts`.
    pub fn spawn(
        config: &PushSyncConfig,
        pubsub: Arc<dyn PubSub>,
        chunk_store: Arc<dyn ChunkStore>,
        overlay: Arc<dyn Overlay>,
        local_receipts: mpsc::Sender<Address>,
    ) -> Result<Self, ProtocolError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.storer_buffer_size.max(1));
        let registration = pubsub.register(TOPIC_CHUNK, true, Arc::new(ChunkHandler { inbound_tx }))?;
        let shutdown = Shutdown::new();

        let task = StorerTask {
            pubsub,
            chunk_store,
            overlay,
            local_receipts,
            seen: TtlSet::new(config.dedup_ttl),
        };
        let gc_interval = config.dedup_gc_interval.max(MIN_DEDUP_GC_INTERVAL);
        let handle = tokio::spawn(task.run(inbound_rx, shutdown.to_signal(), gc_interval));

        Ok(Self {
            registration,
            shutdown: Mutex::new(shutdown),
            task: Mutex::new(Some(handle)),
        })
    }

    /// Deregister the chunk handler and wait for the storer task to exit
    pub async fn close(&self) {
        self.registration.deregister();
        acquire_lock!(self.shutdown).trigger();
        let handle = acquire_lock!(self.task).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(target: LOG_TARGET, "Storer task failed: {}", err);
            }
        }
    }
}

struct ChunkHandler {
    inbound_tx: mpsc::Sender<Bytes>,
}

impl TopicHandler for ChunkHandler {
    fn handle(&self, msg: Bytes, _peer: &PeerHandle) -> Result<(), PubSubError> {
        match self.inbound_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(target: LOG_TARGET, "Storer inbound buffer is full. Chunk message dropped");
                Ok(())
            },
            Err(TrySendError::Closed(_)) => Err(PubSubError::Closed),
        }
    }
}

struct StorerTask {
    pubsub: Arc<dyn PubSub>,
    chunk_store: Arc<dyn ChunkStore>,
    overlay: Arc<dyn Overlay>,
    local_receipts: mpsc::Sender<Address>,
    seen: TtlSet<MessageDigest>,
}

impl StorerTask {
    async fn run(
        self,
        mut inbound_rx: mpsc::Receiver<Bytes>,
        mut shutdown_signal: ShutdownSignal,
        gc_interval: Duration,
    ) {
        info!(target: LOG_TARGET, "Storer started");
        let mut gc_ticker = time::interval_at(time::Instant::now() + gc_interval, gc_interval);
        gc_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = inbound_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                },

                _ = gc_ticker.tick() => {
                    let removed = self.seen.gc();
                    if removed > 0 {
                        debug!(target: LOG_TARGET, "Removed {} expired message digest(s)", removed);
                    }
                },

                _ = shutdown_signal.wait() => {
                    break;
                },
            }
        }
        info!(target: LOG_TARGET, "Storer stopped");
    }

    async fn handle_message(&self, raw: Bytes) {
        let mut digest = MessageDigest::default();
        digest.copy_from_slice(&Blake2s256::digest(&raw));
        if self.seen.has(&digest) {
            trace!(target: LOG_TARGET, "Ignoring replayed chunk message");
            return;
        }

        let msg = match ChunkMessage::from_wire_bytes(&raw) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(target: LOG_TARGET, "Discarding malformed chunk message: {}", err);
                return;
            },
        };
        self.seen.add(digest);

        let address = msg.chunk_address;
        if let Err(err) = self.store_and_reply(msg).await {
            warn!(
                target: LOG_TARGET,
                "Failed to process chunk {}: {}",
                address.short_str(),
                err
            );
        }
    }

    async fn store_and_reply(&self, msg: ChunkMessage) -> Result<(), ProtocolError> {
        let ChunkMessage {
            chunk_address,
            data,
            origin,
            ..
        } = msg;

        match self.chunk_store.put(Chunk::new(chunk_address, data)).await? {
            PutOutcome::Stored => trace!(target: LOG_TARGET, "Stored chunk {}", chunk_address.short_str()),
            PutOutcome::AlreadyExists => {
                trace!(target: LOG_TARGET, "Chunk {} already stored", chunk_address.short_str())
            },
        }

        if self.overlay.exists_closer_peer(&chunk_address) {
            trace!(
                target: LOG_TARGET,
                "A closer peer exists for chunk {}. Not sending a receipt",
                chunk_address.short_str()
            );
            return Ok(());
        }

        if origin == self.pubsub.base_address() {
            self.local_receipts
                .send(chunk_address)
                .await
                .map_err(|_| ProtocolError::ReceiptSinkClosed)?;
            return Ok(());
        }

        let receipt = ReceiptMessage::new(chunk_address, fresh_nonce());
        self.pubsub
            .send(origin, TOPIC_RECEIPT, Bytes::from(receipt.to_wire_bytes()?))
            .await?;
        trace!(
            target: LOG_TARGET,
            "Sent receipt for chunk {} to {}",
            chunk_address.short_str(),
            origin.short_str()
        );
        Ok(())
    }
}
