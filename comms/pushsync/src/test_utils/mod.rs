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

//! Mocks and helpers for testing push-sync components

mod overlay;
pub use overlay::MockOverlay;

mod pubsub;
pub use pubsub::{create_pubsub_mock, MockPubSub, MockPubSubState, SentMessage};

use rand::{rngs::OsRng, Rng, RngCore};

use crate::chunk::{Address, Chunk, MAX_CHUNK_SIZE};

/// An address with `index` in its first 8 bytes (big-endian) and zeros elsewhere
pub fn address_with_index(index: u64) -> Address {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&index.to_be_bytes());
    Address::new(bytes)
}

pub fn random_address() -> Address {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Address::new(bytes)
}

/// A chunk with random data at `address`. The address is not the hash of the data.
pub fn random_chunk(address: Address) -> Chunk {
    let len = OsRng.gen_range(1..=MAX_CHUNK_SIZE);
    let mut data = vec![0u8; len];
    OsRng.fill_bytes(&mut data);
    Chunk::new(address, data)
}
