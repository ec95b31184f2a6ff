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

//! # Scheduler
//!
//! Drives the persistent queue through the dispatcher. The scheduler is made up of four tasks that communicate over
//! bounded channels:
//!
//! - The writer is the only task that mutates the queue. It serves [SchedulerRequest]s, receipts and neighbourhood
//!   depth updates, accumulating mutations in a store batch and handing the batch to the batch writer whenever the
//!   batch writer is idle. It also owns the scan cursor and the retry timer.
//! - The batch writer commits each batch and then, if requested, scans the next run of queue entries and passes them
//!   to the buffer feeder.
//! - The buffer feeder loads the payload of each scanned entry from the chunk store. Entries whose chunk is missing
//!   are treated as receipted so that they leave the queue.
//! - The dispatch loop sends each loaded chunk that is due, enforcing the retry interval per chunk.

mod batch_writer;
mod dispatch;

mod error;
pub use error::SchedulerError;

mod feeder;

mod handle;
pub use handle::{SchedulerHandle, SchedulerRequest};

mod writer;
pub use writer::Scheduler;
