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

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::{chunk::Address, overlay::Overlay};

/// An overlay with a settable depth
pub struct MockOverlay {
    depth_tx: watch::Sender<u16>,
    closer_peer_exists: AtomicBool,
}

impl MockOverlay {
    pub fn new(depth: u16) -> Self {
        let (depth_tx, _) = watch::channel(depth);
        Self {
            depth_tx,
            closer_peer_exists: AtomicBool::new(false),
        }
    }

    pub fn set_depth(&self, depth: u16) {
        self.depth_tx.send_replace(depth);
    }

    pub fn set_closer_peer_exists(&self, exists: bool) {
        self.closer_peer_exists.store(exists, Ordering::SeqCst);
    }
}

impl Overlay for MockOverlay {
    fn exists_closer_peer(&self, _address: &Address) -> bool {
        self.closer_peer_exists.load(Ordering::SeqCst)
    }

    fn subscribe_depth(&self) -> watch::Receiver<u16> {
        self.depth_tx.subscribe()
    }
}
