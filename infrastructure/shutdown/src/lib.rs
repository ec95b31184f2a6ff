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

//! # Tari Shutdown
//!
//! A [Shutdown] trigger and the [ShutdownSignal] futures it hands out. Long-running tasks hold a signal and select on
//! it next to their work; the owner of the trigger stops them all at once.

pub mod oneshot_trigger;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::future::FusedFuture;

use crate::oneshot_trigger::{OneshotSignal, OneshotTrigger};

/// Trigger for shutdowns.
///
/// Use `to_signal` to create a future which will resolve when `Shutdown` is triggered.
/// Use `trigger` to signal. All signals will resolve.
///
/// _Note_: This will trigger when dropped, so the `Shutdown` instance should be held for as long as the tasks
/// listening on its signals should keep running.
#[derive(Clone, Debug)]
pub struct Shutdown(OneshotTrigger<()>);

impl Shutdown {
    pub fn new() -> Self {
        Self(OneshotTrigger::new())
    }

    pub fn trigger(&mut self) {
        self.0.broadcast(());
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_used()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        self.0.to_signal().into()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver end of a shutdown signal. Once received the consumer should shut down.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(OneshotSignal<()>);

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        self.0.is_terminated()
    }

    /// Wait for the shutdown signal to trigger. Awaiting the returned reference does not consume the signal, so it
    /// can be used in a `select!` loop.
    pub fn wait(&mut self) -> &mut Self {
        self
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.0).poll(cx) {
            // Triggered (Some) or the Shutdown was dropped (None)
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedFuture for ShutdownSignal {
    fn is_terminated(&self) -> bool {
        self.0.is_terminated()
    }
}

impl From<OneshotSignal<()>> for ShutdownSignal {
    fn from(inner: OneshotSignal<()>) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::{task, time};

    use super::*;

    #[tokio::test]
    async fn trigger() {
        let mut shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        assert!(!shutdown.is_triggered());
        let fut = task::spawn(async move {
            signal.await;
        });
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        // Shutdown::trigger is idempotent
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn drop_trigger() {
        let shutdown = Shutdown::new();
        let signal = shutdown.to_signal();
        let signal_clone = signal.clone();
        let fut = task::spawn(async move {
            signal_clone.await;
            signal.await;
        });
        drop(shutdown);
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn wait_can_be_polled_repeatedly_in_a_select_loop() {
        let mut shutdown = Shutdown::new();
        let mut signal = shutdown.to_signal();
        let mut ticks = 0;
        loop {
            tokio::select! {
                biased;
                _ = signal.wait() => break,
                _ = time::sleep(Duration::from_millis(1)) => {
                    ticks += 1;
                    if ticks == 3 {
                        shutdown.trigger();
                    }
                },
            }
        }
        assert_eq!(ticks, 3);
        assert!(signal.is_triggered());
        // A resolved signal stays resolved
        signal.wait().await;
    }
}
