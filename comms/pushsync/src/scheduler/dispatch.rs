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

use std::{sync::Arc, time::Duration};

use log::*;
use tari_shutdown::ShutdownSignal;
use tokio::{
    sync::mpsc,
    time::Instant,
};

use crate::{
    protocol::Dispatcher,
    queue::{PendingPush, WaitingIndex},
    tags::{ChunkState, Tags},
};

const LOG_TARGET: &str = "comms::pushsync::scheduler::dispatch";

/// Sends loaded chunks that are due, one at a time
pub(super) struct DispatchLoop {
    dispatcher: Arc<Dispatcher>,
    index: WaitingIndex,
    tags: Arc<Tags>,
    retry_interval: Duration,
    dispatch_rx: mpsc::Receiver<PendingPush>,
    shutdown_signal: ShutdownSignal,
}

impl DispatchLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        index: WaitingIndex,
        tags: Arc<Tags>,
        retry_interval: Duration,
        dispatch_rx: mpsc::Receiver<PendingPush>,
        shutdown_signal: ShutdownSignal,
    ) -> Self {
        Self {
            dispatcher,
            index,
            tags,
            retry_interval,
            dispatch_rx,
            shutdown_signal,
        }
    }

    pub async fn run(mut self) {
        debug!(target: LOG_TARGET, "Dispatch loop started");
        loop {
            let pending = tokio::select! {
                biased;

                _ = self.shutdown_signal.wait() => break,

                pending = self.dispatch_rx.recv() => match pending {
                    Some(pending) => pending,
                    None => break,
                },
            };
            self.dispatch(pending).await;
        }
        debug!(target: LOG_TARGET, "Dispatch loop stopped");
    }

    async fn dispatch(&self, mut pending: PendingPush) {
        let item = pending.item().clone();
        if !self.index.is_current(&item) {
            trace!(
                target: LOG_TARGET,
                "Chunk {} at {} is no longer waiting",
                item.address().short_str(),
                item.key()
            );
            return;
        }

        let prev = match item.mark_sent_if_due(Instant::now(), self.retry_interval) {
            Some(prev) => prev,
            None => {
                trace!(
                    target: LOG_TARGET,
                    "Chunk {} is not due for dispatch",
                    item.address().short_str()
                );
                return;
            },
        };
        if prev != ChunkState::Sent {
            self.tags.inc(item.tag(), ChunkState::Sent);
        }

        if let Some(chunk) = pending.take_chunk() {
            if let Err(err) = self.dispatcher.send(&chunk).await {
                warn!(
                    target: LOG_TARGET,
                    "Failed to send chunk {}: {}. It will be retried after the retry interval",
                    chunk.address().short_str(),
                    err
                );
            }
        }
    }
}
