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
use tari_storage::KeyValueStore;
use tokio::{
    sync::{mpsc, oneshot},
    task,
};

use crate::{
    queue::{PushItem, QueueDb, StoreBatch},
    scheduler::SchedulerError,
    tags::ChunkState,
};

const LOG_TARGET: &str = "comms::pushsync::scheduler::batch_writer";

pub(super) struct FlushJob {
    pub batch: StoreBatch,
    pub waiters: Vec<oneshot::Sender<Result<(), SchedulerError>>>,
    pub scan: Option<ScanRequest>,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct ScanRequest {
    pub from_seq: u64,
    pub max_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct ScanOutcome {
    /// The number of entries read, including superseded and synced entries that were not passed on
    pub count: usize,
    pub next_seq: u64,
}

pub(super) struct FlushOutcome {
    pub result: Result<Option<ScanOutcome>, SchedulerError>,
}

pub(super) async fn run<B: KeyValueStore + 'static>(
    db: QueueDb<B>,
    mut job_rx: mpsc::Receiver<FlushJob>,
    outcome_tx: mpsc::Sender<FlushOutcome>,
    items_tx: mpsc::Sender<Vec<Arc<PushItem>>>,
) {
    debug!(target: LOG_TARGET, "Batch writer started");
    while let Some(job) = job_rx.recv().await {
        let result = process_job(&db, job, &items_tx).await;
        if outcome_tx.send(FlushOutcome { result }).await.is_err() {
            break;
        }
    }
    debug!(target: LOG_TARGET, "Batch writer stopped");
}

async fn process_job<B: KeyValueStore + 'static>(
    db: &QueueDb<B>,
    job: FlushJob,
    items_tx: &mpsc::Sender<Vec<Arc<PushItem>>>,
) -> Result<Option<ScanOutcome>, SchedulerError> {
    let FlushJob { batch, waiters, scan } = job;

    if !batch.is_empty() {
        let num_enqueued = batch.num_enqueued();
        let num_deleted = batch.deleted().len();
        let db = db.clone();
        let result = task::spawn_blocking(move || db.commit(batch))
            .await
            .map_err(|err| SchedulerError::StorageFailure(format!("Commit task failed: {}", err)))
            .and_then(|result| result.map_err(SchedulerError::from));
        if let Err(err) = result {
            for waiter in waiters {
                let _ = waiter.send(Err(err.clone()));
            }
            return Err(err);
        }
        debug!(
            target: LOG_TARGET,
            "Flushed batch ({} enqueued, {} deleted)", num_enqueued, num_deleted
        );
    }
    for waiter in waiters {
        let _ = waiter.send(Ok(()));
    }

    let scan = match scan {
        Some(scan) => scan,
        None => return Ok(None),
    };
    let scan_db = db.clone();
    let (entries, next_seq) = task::spawn_blocking(move || scan_db.scan(scan.from_seq, scan.max_count))
        .await
        .map_err(|err| SchedulerError::StorageFailure(format!("Scan task failed: {}", err)))??;

    let count = entries.len();
    let items = entries
        .into_iter()
        .filter_map(|(key, entry)| db.index().index_scanned(key, entry))
        .filter(|item| item.state() != ChunkState::Synced)
        .collect::<Vec<_>>();
    debug!(
        target: LOG_TARGET,
        "Scanned {} queue entries from #{}. {} to feed",
        count,
        scan.from_seq,
        items.len()
    );
    if !items.is_empty() && items_tx.send(items).await.is_err() {
        debug!(target: LOG_TARGET, "Buffer feeder has stopped. Scanned items discarded");
    }

    Ok(Some(ScanOutcome { count, next_seq }))
}
