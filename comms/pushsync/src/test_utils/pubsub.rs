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
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{self, Instant};

use crate::{
    chunk::Address,
    pubsub::{PeerHandle, PubSub, PubSubError, Registration, TopicHandler},
};

pub fn create_pubsub_mock(base_address: Address) -> (Arc<MockPubSub>, MockPubSubState) {
    let pubsub = MockPubSub::new(base_address);
    let state = pubsub.get_shared_state();
    (Arc::new(pubsub), state)
}

/// A message passed to [MockPubSub::send]
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub destination: Address,
    pub topic: &'static str,
    pub msg: Bytes,
    pub sent_at: Instant,
}

type SendHook = Arc<dyn Fn(&SentMessage) + Send + Sync>;

#[derive(Default)]
struct State {
    calls: Vec<SentMessage>,
    handlers: HashMap<&'static str, (bool, Arc<dyn TopicHandler>)>,
    fail_sends: bool,
    on_send: Option<SendHook>,
}

#[derive(Clone, Default)]
pub struct MockPubSubState {
    inner: Arc<Mutex<State>>,
}

impl MockPubSubState {
    fn with_state<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut State) -> R {
        let mut state = acquire_lock!(self.inner);
        f(&mut state)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn sent_on(&self, topic: &str) -> Vec<SentMessage> {
        self.with_state(|state| state.calls.iter().filter(|m| m.topic == topic).cloned().collect())
    }

    pub fn take_sent(&self) -> Vec<SentMessage> {
        self.with_state(|state| state.calls.drain(..).collect())
    }

    pub fn call_count(&self) -> usize {
        self.with_state(|state| state.calls.len())
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_fail_sends(&self, fail: bool) {
        self.with_state(|state| state.fail_sends = fail)
    }

    /// Install a hook called for every successful send. The hook can be used to respond to messages.
    pub fn set_on_send<F>(&self, f: F)
    where F: Fn(&SentMessage) + Send + Sync + 'static {
        self.with_state(|state| state.on_send = Some(Arc::new(f)))
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.with_state(|state| state.handlers.contains_key(topic))
    }

    pub fn is_proximity_addressed(&self, topic: &str) -> Option<bool> {
        self.with_state(|state| state.handlers.get(topic).map(|(p, _)| *p))
    }

    /// Deliver an inbound message to the handler registered for `topic`
    pub fn deliver(&self, topic: &str, msg: Bytes, peer: &PeerHandle) -> Result<(), PubSubError> {
        let handler = self
            .with_state(|state| state.handlers.get(topic).map(|(_, h)| h.clone()))
            .ok_or_else(|| PubSubError::HandlerFailed(format!("No handler registered for topic '{}'", topic)))?;
        handler.handle(msg, peer)
    }

    pub async fn await_call_count(&self, count: usize, timeout: Duration) -> Vec<SentMessage> {
        let deadline = Instant::now() + timeout;
        while self.call_count() < count {
            assert!(
                Instant::now() < deadline,
                "expected call count to reach {} within {:.2?} but it was {}",
                count,
                timeout,
                self.call_count()
            );
            time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

pub struct MockPubSub {
    base_address: Address,
    state: MockPubSubState,
}

impl MockPubSub {
    pub fn new(base_address: Address) -> Self {
        Self {
            base_address,
            state: Default::default(),
        }
    }

    pub fn get_shared_state(&self) -> MockPubSubState {
        self.state.clone()
    }
}

#[async_trait]
impl PubSub for MockPubSub {
    fn base_address(&self) -> Address {
        self.base_address
    }

    fn register(
        &self,
        topic: &'static str,
        proximity_addressed: bool,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<Registration, PubSubError> {
        self.state.with_state(|state| {
            if state.handlers.contains_key(topic) {
                return Err(PubSubError::TopicAlreadyRegistered(topic));
            }
            state.handlers.insert(topic, (proximity_addressed, handler));
            Ok(())
        })?;
        let state = self.state.clone();
        Ok(Registration::new(topic, move || {
            state.with_state(|state| state.handlers.remove(topic));
        }))
    }

    async fn send(&self, destination: Address, topic: &'static str, msg: Bytes) -> Result<(), PubSubError> {
        let sent = SentMessage {
            destination,
            topic,
            msg,
            sent_at: Instant::now(),
        };
        let hook = self.state.with_state(|state| {
            if state.fail_sends {
                return Err(PubSubError::SendFailed("Mock send failure".to_string()));
            }
            state.calls.push(sent.clone());
            Ok(state.on_send.clone())
        })?;
        if let Some(hook) = hook {
            hook(&sent);
        }
        Ok(())
    }
}
