// Copyright 2019, The Tari Project
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

//! A single-use trigger whose signal can be cloned and awaited from any number of tasks.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures::{
    channel::oneshot,
    future::{FusedFuture, Shared},
    FutureExt,
};

#[derive(Clone, Debug)]
pub struct OneshotTrigger<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
    signal: OneshotSignal<T>,
}

impl<T: Clone> OneshotTrigger<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            signal: rx.shared().into(),
        }
    }

    pub fn to_signal(&self) -> OneshotSignal<T> {
        self.signal.clone()
    }

    /// Resolve every signal with `item`. Only the first call has an effect.
    pub fn broadcast(&mut self, item: T) {
        if let Some(tx) = self.sender_lock().take() {
            let _result = tx.send(item);
        }
    }

    pub fn is_used(&self) -> bool {
        self.sender_lock().is_none()
    }

    fn sender_lock(&self) -> MutexGuard<'_, Option<oneshot::Sender<T>>> {
        // The guarded value is only ever taken, so a poisoned lock still holds a usable state
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for OneshotTrigger<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct OneshotSignal<T> {
    inner: Shared<oneshot::Receiver<T>>,
}

impl<T: Clone> From<Shared<oneshot::Receiver<T>>> for OneshotSignal<T> {
    fn from(inner: Shared<oneshot::Receiver<T>>) -> Self {
        Self { inner }
    }
}

impl<T: Clone> Future for OneshotSignal<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.is_terminated() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(Some(v)),
            // Trigger dropped without broadcasting
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Clone> FusedFuture for OneshotSignal<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn broadcast_resolves_every_clone() {
        let mut trigger = OneshotTrigger::<u16>::new();
        let signal1 = trigger.to_signal();
        let signal2 = signal1.clone();
        assert!(!trigger.is_used());
        trigger.broadcast(7);
        assert!(trigger.is_used());
        // Only the first broadcast is delivered
        trigger.broadcast(8);
        assert_eq!(signal1.await, Some(7));
        assert_eq!(signal2.await, Some(7));
    }

    #[tokio::test]
    async fn dropped_trigger_resolves_with_none() {
        let trigger = OneshotTrigger::<u16>::new();
        let signal = trigger.to_signal();
        drop(trigger);
        assert_eq!(signal.await, None);
    }
}
