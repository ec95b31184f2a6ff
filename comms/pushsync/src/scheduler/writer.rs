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

use std::{mem, sync::Arc, time::Duration};

use log::*;
use tari_shutdown::Shutdown;
use tari_storage::KeyValueStore;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task,
    time,
    time::Instant,
};

use crate::{
    chunk::Address,
    chunk_store::ChunkStore,
    config::PushSyncConfig,
    protocol::Dispatcher,
    queue::{PersistentQueue, QueueEntry, StoreBatch},
    scheduler::{
        batch_writer,
        batch_writer::{FlushJob, FlushOutcome, ScanOutcome, ScanRequest},
        dispatch::DispatchLoop,
        feeder::BufferFeeder,
        SchedulerError,
        SchedulerHandle,
        SchedulerRequest,
    },
    tags::{ChunkState, Tags},
};

const LOG_TARGET: &str = "comms::pushsync::scheduler";

type Reply = oneshot::Sender<Result<(), SchedulerError>>;

/// The push-sync scheduler. Construct it with its collaborators and call [Scheduler::spawn] to start its tasks.
pub struct Scheduler<B> {
    config: PushSyncConfig,
    queue: PersistentQueue<B>,
    tags: Arc<Tags>,
    chunk_store: Arc<dyn ChunkStore>,
    dispatcher: Arc<Dispatcher>,
    depth_rx: watch::Receiver<u16>,
    receipt_tx: mpsc::Sender<Address>,
    receipt_rx: mpsc::Receiver<Address>,
}

impl<B: KeyValueStore + 'static> Scheduler<B> {
    /// `receipt_rx` receives the address of every receipted chunk. `receipt_tx` must be a sender for the same channel.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PushSyncConfig,
        queue: PersistentQueue<B>,
        tags: Arc<Tags>,
        chunk_store: Arc<dyn ChunkStore>,
        dispatcher: Arc<Dispatcher>,
        depth_rx: watch::Receiver<u16>,
        receipt_tx: mpsc::Sender<Address>,
        receipt_rx: mpsc::Receiver<Address>,
    ) -> Self {
        Self {
            config,
            queue,
            tags,
            chunk_store,
            dispatcher,
            depth_rx,
            receipt_tx,
            receipt_rx,
        }
    }

    /// Spawn the scheduler tasks and return a handle to the writer
    pub fn spawn(self) -> SchedulerHandle {
        let Self {
            config,
            queue,
            tags,
            chunk_store,
            dispatcher,
            depth_rx,
            receipt_tx,
            receipt_rx,
        } = self;

        let (request_tx, request_rx) = mpsc::channel(config.request_buffer_size.max(1));
        let (job_tx, job_rx) = mpsc::channel(1);
        let (outcome_tx, outcome_rx) = mpsc::channel(1);
        let (items_tx, items_rx) = mpsc::channel(config.items_buffer_size.max(1));
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_buffer_size.max(1));
        let shutdown = Shutdown::new();

        tokio::spawn(batch_writer::run(queue.db(), job_rx, outcome_tx, items_tx));
        tokio::spawn(
            BufferFeeder::new(chunk_store, items_rx, dispatch_tx, receipt_tx, shutdown.to_signal()).run(),
        );
        tokio::spawn(
            DispatchLoop::new(
                dispatcher,
                queue.index().clone(),
                tags.clone(),
                config.retry_interval,
                dispatch_rx,
                shutdown.to_signal(),
            )
            .run(),
        );

        let depth = *depth_rx.borrow();
        let durable_size = queue.pending_size();
        let writer = Writer {
            queue,
            tags,
            scan_batch_size: config.scan_batch_size.max(1),
            retry_interval: config.retry_interval,
            request_rx,
            requests_open: true,
            receipt_rx,
            depth_rx,
            depth_updates_open: true,
            depth,
            job_tx,
            outcome_rx,
            shutdown,
            batch: StoreBatch::new(),
            flush_waiters: Vec::new(),
            batch_writer_idle: true,
            in_flight_size: None,
            durable_size,
            cursor: 0,
            scan_requested: true,
            retry_deadline: None,
            closing: false,
            close_replies: Vec::new(),
            fatal: None,
        };
        tokio::spawn(writer.run());

        SchedulerHandle::new(request_tx)
    }
}

struct Writer<B> {
    queue: PersistentQueue<B>,
    tags: Arc<Tags>,
    scan_batch_size: usize,
    retry_interval: Duration,
    request_rx: mpsc::Receiver<SchedulerRequest>,
    requests_open: bool,
    receipt_rx: mpsc::Receiver<Address>,
    depth_rx: watch::Receiver<u16>,
    depth_updates_open: bool,
    depth: u16,
    job_tx: mpsc::Sender<FlushJob>,
    outcome_rx: mpsc::Receiver<FlushOutcome>,
    shutdown: Shutdown,
    batch: StoreBatch,
    flush_waiters: Vec<Reply>,
    batch_writer_idle: bool,
    // The queue size recorded by the batch the batch writer is committing
    in_flight_size: Option<u64>,
    durable_size: u64,
    cursor: u64,
    scan_requested: bool,
    retry_deadline: Option<Instant>,
    closing: bool,
    close_replies: Vec<Reply>,
    fatal: Option<SchedulerError>,
}

impl<B: KeyValueStore + 'static> Writer<B> {
    async fn run(mut self) {
        info!(
            target: LOG_TARGET,
            "Push-sync scheduler started with {} queued chunk(s)", self.durable_size
        );

        loop {
            self.hand_off();
            if self.is_drained() {
                break;
            }

            let retry_deadline = self.retry_deadline;
            tokio::select! {
                request = self.request_rx.recv(), if self.requests_open => {
                    match request {
                        Some(request) => self.handle_request(request),
                        None => {
                            debug!(target: LOG_TARGET, "All scheduler handles dropped");
                            self.requests_open = false;
                            self.begin_close();
                        },
                    }
                },

                Some(address) = self.receipt_rx.recv() => {
                    self.handle_receipt(&address);
                },

                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_flush_outcome(outcome);
                },

                _ = time::sleep_until(retry_deadline.unwrap_or_else(Instant::now)), if retry_deadline.is_some() => {
                    self.handle_retry_timer();
                },

                changed = self.depth_rx.changed(), if self.depth_updates_open => {
                    match changed {
                        Ok(()) => {
                            self.depth = *self.depth_rx.borrow();
                            debug!(target: LOG_TARGET, "Neighbourhood depth is now {}", self.depth);
                        },
                        Err(_) => self.depth_updates_open = false,
                    }
                },
            }
        }

        self.finish().await;
    }

    fn handle_request(&mut self, request: SchedulerRequest) {
        use SchedulerRequest::*;
        trace!(target: LOG_TARGET, "Scheduler request: {}", request);
        match request {
            Enqueue(entry, reply) => {
                let _ = reply.send(self.enqueue(entry));
            },
            Flush(reply) => match &self.fatal {
                Some(err) => {
                    let _ = reply.send(Err(err.clone()));
                },
                None => self.flush_waiters.push(reply),
            },
            GetQueueSize(reply) => {
                let result = match &self.fatal {
                    Some(err) => Err(err.clone()),
                    None => Ok(self.durable_size),
                };
                let _ = reply.send(result);
            },
            Close(reply) => {
                self.close_replies.push(reply);
                self.begin_close();
            },
        }
    }

    fn enqueue(&mut self, entry: QueueEntry) -> Result<(), SchedulerError> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }
        if self.closing {
            return Err(SchedulerError::Closed);
        }

        let proximity_order = entry.proximity_order;
        let item = self.queue.enqueue(&mut self.batch, entry)?;
        self.scan_requested = true;

        if self.depth <= proximity_order {
            let address = *item.address();
            trace!(
                target: LOG_TARGET,
                "Chunk {} is within the neighbourhood (depth = {}, proximity order = {})",
                address.short_str(),
                self.depth,
                proximity_order
            );
            self.apply_receipt(&address);
        }
        Ok(())
    }

    fn handle_receipt(&mut self, address: &Address) {
        if self.fatal.is_some() {
            return;
        }
        self.apply_receipt(address);
    }

    fn apply_receipt(&mut self, address: &Address) {
        match self.queue.mark_synced(&mut self.batch, address) {
            Some((item, prev)) => {
                // Chunks synced without being dispatched still count as sent so that SENT >= SYNCED
                if prev != ChunkState::Sent {
                    self.tags.inc(item.tag(), ChunkState::Sent);
                }
                self.tags.inc(item.tag(), ChunkState::Synced);
                trace!(target: LOG_TARGET, "Chunk {} synced", address.short_str());
            },
            None => {
                trace!(
                    target: LOG_TARGET,
                    "Ignoring receipt for chunk {} which is not waiting",
                    address.short_str()
                );
            },
        }
    }

    fn handle_flush_outcome(&mut self, outcome: FlushOutcome) {
        self.batch_writer_idle = true;
        let in_flight_size = self.in_flight_size.take();
        match outcome.result {
            Ok(scan) => {
                if let Some(size) = in_flight_size {
                    self.durable_size = size;
                }
                if let Some(scan) = scan {
                    self.apply_scan(scan);
                }
            },
            Err(err) => self.set_fatal(err),
        }
    }

    fn apply_scan(&mut self, scan: ScanOutcome) {
        // An empty scan returns the cursor it started from, so the cursor is kept
        self.cursor = scan.next_seq;
        if scan.count >= self.scan_batch_size {
            self.scan_requested = true;
            return;
        }
        if self.retry_deadline.is_none() && self.queue.pending_size() > 0 {
            self.retry_deadline = Some(Instant::now() + self.retry_interval);
        }
    }

    fn handle_retry_timer(&mut self) {
        self.retry_deadline = None;
        if self.closing || self.fatal.is_some() {
            return;
        }
        trace!(target: LOG_TARGET, "Retry interval elapsed. Rescanning from the start of the queue");
        self.cursor = 0;
        self.scan_requested = true;
    }

    /// Hand the current batch to the batch writer if it is idle and there is work for it
    fn hand_off(&mut self) {
        if !self.batch_writer_idle || self.fatal.is_some() {
            return;
        }
        let wants_scan = self.scan_requested && !self.closing;
        if self.batch.is_empty() && self.flush_waiters.is_empty() && !wants_scan {
            return;
        }

        let scan = if wants_scan {
            self.scan_requested = false;
            Some(ScanRequest {
                from_seq: self.cursor,
                max_count: self.scan_batch_size,
            })
        } else {
            None
        };
        let job = FlushJob {
            batch: mem::take(&mut self.batch),
            waiters: mem::take(&mut self.flush_waiters),
            scan,
        };
        self.in_flight_size = job.batch.size();
        match self.job_tx.try_send(job) {
            Ok(()) => {
                self.batch_writer_idle = false;
            },
            Err(_) => {
                self.in_flight_size = None;
                self.set_fatal(SchedulerError::StorageFailure(
                    "The batch writer has stopped".to_string(),
                ));
            },
        }
    }

    fn begin_close(&mut self) {
        if self.closing {
            return;
        }
        info!(target: LOG_TARGET, "Push-sync scheduler is closing");
        self.closing = true;
        self.retry_deadline = None;
        self.shutdown.trigger();
    }

    fn set_fatal(&mut self, err: SchedulerError) {
        error!(
            target: LOG_TARGET,
            "Push-sync scheduler stopped processing the queue: {}", err
        );
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
        self.fatal = Some(err);
        self.retry_deadline = None;
        self.shutdown.trigger();
    }

    fn is_drained(&self) -> bool {
        if !self.closing || !self.batch_writer_idle {
            return false;
        }
        self.fatal.is_some() || (self.batch.is_empty() && self.flush_waiters.is_empty())
    }

    async fn finish(self) {
        let Self {
            queue,
            batch,
            close_replies,
            fatal,
            request_rx,
            ..
        } = self;
        // Requests sent after this point fail with Closed
        drop(request_rx);

        let result = match fatal {
            Some(err) => Err(err),
            None => task::spawn_blocking(move || queue.close(batch))
                .await
                .map_err(|err| SchedulerError::StorageFailure(format!("Close task failed: {}", err)))
                .and_then(|result| result.map_err(SchedulerError::from)),
        };
        for reply in close_replies {
            let _ = reply.send(result.clone());
        }
        match result {
            Ok(()) => info!(target: LOG_TARGET, "Push-sync scheduler stopped"),
            Err(err) => warn!(target: LOG_TARGET, "Push-sync scheduler stopped with error: {}", err),
        }
    }
}
