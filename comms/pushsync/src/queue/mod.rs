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

//! # Persistent queue
//!
//! A durable FIFO of chunks waiting to be pushed to their neighbourhood. Entries are stored under 9-byte keys (a
//! `0x00` prefix followed by a big-endian sequence number) so that iteration in key order is enqueue order. Two
//! reserved keys hold the last issued sequence number and the number of entries on disk.
//!
//! All mutations are staged in a [StoreBatch] and written atomically on commit. The in-memory [WaitingIndex] maps
//! each outstanding address to the most recently enqueued [PushItem] for it.

mod batch;
pub use batch::StoreBatch;

mod entry;
pub use entry::{PendingPush, PushItem, QueueEntry};

mod error;
pub use error::QueueError;

mod index;
pub use index::WaitingIndex;

mod key;
pub use key::{QueueKey, ENTRY_PREFIX, LAST_SEQ_KEY, QUEUE_KEY_LENGTH, SIZE_KEY};

mod queue;
pub use queue::{PersistentQueue, QueueDb, ScanResult};
