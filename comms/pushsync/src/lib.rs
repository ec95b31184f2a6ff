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

#![cfg_attr(not(debug_assertions), deny(unused_variables))]
#![cfg_attr(not(debug_assertions), deny(unused_imports))]
#![cfg_attr(not(debug_assertions), deny(dead_code))]
#![cfg_attr(not(debug_assertions), deny(unused_extern_crates))]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]

//! # Tari Comms Push-Sync
//!
//! Push-sync moves locally created chunks to the nodes responsible for storing them and tracks their progress.
//!
//! A chunk handed to the [Pusher] is stored in the local chunk store and appended to a persistent FIFO queue. The
//! [scheduler] reads the queue in order and sends each chunk to its neighbourhood over the [pubsub] transport. A
//! storing node replies with a receipt, at which point the chunk is removed from the queue. Chunks that are not
//! receipted within the retry interval are sent again. The queue survives restarts, so every chunk is eventually
//! receipted or found to be missing from the local store.
//!
//! Progress is reported per upload through [tags]. Each tag counts chunks in the SPLIT, STORED, SEEN, SENT and
//! SYNCED states and can be awaited until a state is complete.
//!
//! The inbound half of the protocol, the [protocol::Storer], stores chunks that arrive for this node's
//! neighbourhood and sends receipts to their origin.

#[macro_use]
mod macros;

pub mod chunk;
pub mod chunk_store;

mod config;
pub use config::PushSyncConfig;

pub mod overlay;
pub mod protocol;
pub mod pubsub;

mod pusher;
pub use pusher::{PushSyncError, Pusher};

pub mod queue;
pub mod scheduler;

mod serializers;

pub mod tags;
pub mod ttl_set;

#[cfg(any(test, feature = "test-mocks"))]
pub mod test_utils;
