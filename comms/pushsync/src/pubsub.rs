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

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use log::*;
use thiserror::Error;

use crate::chunk::Address;

const LOG_TARGET: &str = "comms::pushsync::pubsub";

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("The messaging transport is closed")]
    Closed,
    #[error("Failed to send message: {0}")]
    SendFailed(String),
    #[error("A handler is already registered for topic '{0}'")]
    TopicAlreadyRegistered(&'static str),
    #[error("Message handler failed: {0}")]
    HandlerFailed(String),
}

/// Opaque information about the peer that delivered an inbound message
#[derive(Debug, Clone, Default)]
pub struct PeerHandle {
    address: Option<Address>,
}

impl PeerHandle {
    pub fn new(address: Address) -> Self {
        Self { address: Some(address) }
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }
}

/// A handler for inbound messages on a topic. Handlers are invoked by the transport and must return quickly: they
/// decode the message and post it into a channel. No disk or network I/O is done inline.
pub trait TopicHandler: Send + Sync {
    fn handle(&self, msg: Bytes, peer: &PeerHandle) -> Result<(), PubSubError>;
}

type DeregisterFn = Box<dyn FnOnce() + Send>;

/// Returned when a topic handler is registered. The handler is deregistered when `deregister` is called or when this
/// is dropped.
pub struct Registration {
    topic: &'static str,
    deregister: Mutex<Option<DeregisterFn>>,
}

impl Registration {
    pub fn new<F>(topic: &'static str, deregister: F) -> Self
    where F: FnOnce() + Send + 'static {
        Self {
            topic,
            deregister: Mutex::new(Some(Box::new(deregister))),
        }
    }

    /// Deregister the handler. Calling this more than once has no effect.
    pub fn deregister(&self) {
        let f = acquire_lock!(self.deregister).take();
        if let Some(f) = f {
            debug!(target: LOG_TARGET, "Deregistering handler for topic '{}'", self.topic);
            f();
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("topic", &self.topic).finish()
    }
}

/// The unreliable datagram-style messaging layer
#[async_trait]
pub trait PubSub: Send + Sync {
    /// The address of this node
    fn base_address(&self) -> Address;

    /// Register a handler for `topic`. If `proximity_addressed` is true the transport delivers messages on this
    /// topic to the nodes whose address falls in the neighbourhood of the destination, rather than to a single
    /// recipient.
    fn register(
        &self,
        topic: &'static str,
        proximity_addressed: bool,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<Registration, PubSubError>;

    /// Send `msg` on `topic` to `destination`
    async fn send(&self, destination: Address, topic: &'static str, msg: Bytes) -> Result<(), PubSubError>;
}
