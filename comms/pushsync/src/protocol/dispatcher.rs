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

use bytes::Bytes;
use log::*;
use tokio::sync::{mpsc, mpsc::error::TrySendError};

use crate::{
    chunk::{Address, Chunk, MAX_CHUNK_SIZE},
    protocol::{
        fresh_nonce,
        ChunkMessage,
        MessageError,
        ProtocolError,
        ReceiptMessage,
        WireDecoding,
        WireEncoding,
        TOPIC_CHUNK,
        TOPIC_RECEIPT,
    },
    pubsub::{PeerHandle, PubSub, PubSubError, Registration, TopicHandler},
};

const LOG_TARGET: &str = "comms::pushsync::protocol::dispatcher";

/// The outbound half of the protocol. Sends chunks to their neighbourhood and forwards the addresses of received
/// receipts to the receipt sink.
pub struct Dispatcher {
    pubsub: Arc<dyn PubSub>,
    registration: Registration,
}

impl Dispatcher {
    /// Create a dispatcher and register its receipt handler
    pub fn new(pubsub: Arc<dyn PubSub>, receipt_sink: mpsc::Sender<Address>) -> Result<Self, ProtocolError> {
        let handler = Arc::new(ReceiptHandler { receipt_sink });
        let registration = pubsub.register(TOPIC_RECEIPT, false, handler)?;
        Ok(Self { pubsub, registration })
    }

    /// Send `chunk` to the neighbourhood of its address. Failures are not retried here.
    pub async fn send(&self, chunk: &Chunk) -> Result<(), ProtocolError> {
        if chunk.len() > MAX_CHUNK_SIZE {
            return Err(MessageError::DataTooLarge(chunk.len()).into());
        }
        let msg = ChunkMessage::new(
            *chunk.address(),
            chunk.data().clone(),
            self.pubsub.base_address(),
            fresh_nonce(),
        );
        let bytes = msg.to_wire_bytes()?;
        self.pubsub
            .send(*chunk.address(), TOPIC_CHUNK, Bytes::from(bytes))
            .await?;
        trace!(target: LOG_TARGET, "Sent chunk {}", chunk.address().short_str());
        Ok(())
    }

    /// Deregister the receipt handler
    pub fn close(&self) {
        self.registration.deregister();
    }
}

struct ReceiptHandler {
    receipt_sink: mpsc::Sender<Address>,
}

impl TopicHandler for ReceiptHandler {
    fn handle(&self, msg: Bytes, peer: &PeerHandle) -> Result<(), PubSubError> {
        let receipt = match ReceiptMessage::from_wire_bytes(&msg) {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    "Discarding malformed receipt from {}: {}",
                    peer.address().map(|a| a.short_str()).unwrap_or_else(|| "<unknown>".to_string()),
                    err
                );
                return Ok(());
            },
        };

        trace!(
            target: LOG_TARGET,
            "Received receipt for chunk {}",
            receipt.chunk_address.short_str()
        );
        match self.receipt_sink.try_send(receipt.chunk_address) {
            Ok(()) => {},
            Err(TrySendError::Full(address)) => {
                // The chunk is dispatched again after the retry interval, which produces another receipt
                warn!(
                    target: LOG_TARGET,
                    "Receipt sink is full. Receipt for chunk {} dropped",
                    address.short_str()
                );
            },
            Err(TrySendError::Closed(address)) => {
                debug!(
                    target: LOG_TARGET,
                    "Receipt sink is closed. Receipt for chunk {} dropped",
                    address.short_str()
                );
            },
        }
        Ok(())
    }
}
