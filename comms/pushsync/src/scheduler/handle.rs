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

use std::{fmt, fmt::Display};

use tokio::sync::{mpsc, oneshot};

use crate::{queue::QueueEntry, scheduler::SchedulerError};

#[derive(Debug)]
pub enum SchedulerRequest {
    /// Stage a new queue entry. Replies once the entry is staged, not once it is durable.
    Enqueue(QueueEntry, oneshot::Sender<Result<(), SchedulerError>>),
    /// Reply once every mutation staged before this request is durable
    Flush(oneshot::Sender<Result<(), SchedulerError>>),
    /// Reply with the persisted queue size
    GetQueueSize(oneshot::Sender<Result<u64, SchedulerError>>),
    /// Drain staged mutations to disk and stop the scheduler
    Close(oneshot::Sender<Result<(), SchedulerError>>),
}

impl Display for SchedulerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SchedulerRequest::*;
        match self {
            Enqueue(entry, _) => write!(f, "Enqueue({})", entry.address.short_str()),
            Flush(_) => f.write_str("Flush"),
            GetQueueSize(_) => f.write_str("GetQueueSize"),
            Close(_) => f.write_str("Close"),
        }
    }
}

/// Handle to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerHandle {
    pub(super) fn new(sender: mpsc::Sender<SchedulerRequest>) -> Self {
        Self { sender }
    }

    pub async fn enqueue(&self, entry: QueueEntry) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send(SchedulerRequest::Enqueue(entry, reply_tx)).await?;
        reply_rx.await.map_err(|_| SchedulerError::RequestCanceled)?
    }

    pub async fn flush(&self) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send(SchedulerRequest::Flush(reply_tx)).await?;
        reply_rx.await.map_err(|_| SchedulerError::RequestCanceled)?
    }

    pub async fn queue_size(&self) -> Result<u64, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send(SchedulerRequest::GetQueueSize(reply_tx)).await?;
        reply_rx.await.map_err(|_| SchedulerError::RequestCanceled)?
    }

    pub async fn close(&self) -> Result<(), SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send(SchedulerRequest::Close(reply_tx)).await?;
        reply_rx.await.map_err(|_| SchedulerError::RequestCanceled)?
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
