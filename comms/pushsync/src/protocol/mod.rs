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

//! # Push-sync protocol
//!
//! Two messages make up the protocol. A [ChunkMessage] carries a chunk from its originator to the neighbourhood of
//! the chunk address, where a [Storer] stores it. Unless it knows of a closer peer, the storer replies to the origin
//! with a [ReceiptMessage] which the originator's [Dispatcher] hands to the scheduler.
//!
//! Both messages carry a freshly drawn nonce. The nonce is not verified. It makes each retransmission of a chunk
//! distinct so that replay protection at the storer does not suppress it.

mod dispatcher;
pub use dispatcher::Dispatcher;

mod error;
pub use error::{MessageError, ProtocolError};

mod message;
pub use message::{fresh_nonce, ChunkMessage, Nonce, ReceiptMessage, WireDecoding, WireEncoding, NONCE_LENGTH};

mod storer;
pub use storer::Storer;

/// Topic of chunk messages. Chunk messages are delivered to the neighbourhood of the destination address.
pub const TOPIC_CHUNK: &str = "CHUNK";
/// Topic of receipt messages
pub const TOPIC_RECEIPT: &str = "RECEIPT";

#[cfg(test)]
mod test;
