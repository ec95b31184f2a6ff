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

use std::sync::Arc;

use log::*;
use tari_shutdown::ShutdownSignal;
use tokio::sync::mpsc;

use crate::{
    chunk::Address,
    chunk_store::{ChunkStore, ChunkStoreError},
    queue::{PendingPush, PushItem},
    tags::ChunkState,
};

const LOG_TARGET: &str = "comms::pushsync::scheduler::feeder";

/// Loads chunk payloads for scanned items and feeds them to the dispatch loop
pub(super) struct BufferFeeder {
    chunk_store: Arc<dyn ChunkStore>,
    items_rx: mpsc::Receiver<Vec<Arc<PushItem>>>,
    dispatch_tx: mpsc::Sender<PendingPush>,
    receipt_tx: mpsc::Sender<Address>,
    shutdown_signal: ShutdownSignal,
}

impl BufferFeeder {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        items_rx: mpsc::Receiver<Vec<Arc<PushItem>>>,
        dispatch_tx: mpsc::Sender<PendingPush>,
        receipt_tx: mpsc::Sender<Address>,
        shutdown_signal: ShutdownSignal,
    ) -> Self {
        Self {
            chunk_store,
            items_rx,
            dispatch_tx,
            receipt_tx,
            shutdown_signal,
        }
    }

    pub async fn run(mut self) {
        debug!(target: LOG_TARGET, "Buffer feeder started");
        loop {
            let items = tokio::select! {
                biased;

                _ = self.shutdown_signal.wait() => break,

                items = self.items_rx.recv() => match items {
                    Some(items) => items,
                    None => break,
                },
            };

            trace!(target: LOG_TARGET, "Feeding {} item(s)", items.len());
            let mut is_running = true;
            for item in items {
                if !self.feed(item).await {
                    is_running = false;
                    break;
                }
            }
            if !is_running {
                break;
            }
        }
        debug!(target: LOG_TARGET, "Buffer feeder stopped");
    }

    /// Load and forward a single item. Returns false if the feeder should stop.
    async fn feed(&mut self, item: Arc<PushItem>) -> bool {
        if item.state() == ChunkState::Synced {
            return true;
        }

        let result = tokio::select! {
            biased;

            _ = self.shutdown_signal.wait() => return false,

            result = self.chunk_store.get(item.address()) => result,
        };

        match result {
            Ok(chunk) => {
                let pending = PendingPush::new(item, chunk.into_data());
                tokio::select! {
                    biased;

                    _ = self.shutdown_signal.wait() => false,

                    result = self.dispatch_tx.send(pending) => result.is_ok(),
                }
            },
            Err(ChunkStoreError::NotFound(address)) => {
                warn!(
                    target: LOG_TARGET,
                    "Chunk {} is missing from the chunk store. Removing it from the push queue",
                    address.short_str()
                );
                self.receipt_tx.send(address).await.is_ok()
            },
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    "Failed to load chunk {}: {}. It will be retried on a later pass",
                    item.address().short_str(),
                    err
                );
                true
            },
        }
    }
}
