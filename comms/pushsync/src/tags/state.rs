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

use std::{fmt, fmt::Display};

use serde::{Deserialize, Serialize};

/// The states a chunk passes through on its way to being synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkState {
    /// Produced by the splitter
    Split,
    /// Stored locally
    Stored,
    /// Already present in the local store when it was put
    Seen,
    /// Sent to the neighbourhood at least once
    Sent,
    /// A receipt was received. The chunk is no longer in the push queue.
    Synced,
}

impl ChunkState {
    pub const ALL: [ChunkState; 5] = [
        ChunkState::Split,
        ChunkState::Stored,
        ChunkState::Seen,
        ChunkState::Sent,
        ChunkState::Synced,
    ];

    pub(crate) fn as_bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl Display for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ChunkState::*;
        match self {
            Split => f.write_str("SPLIT"),
            Stored => f.write_str("STORED"),
            Seen => f.write_str("SEEN"),
            Sent => f.write_str("SENT"),
            Synced => f.write_str("SYNCED"),
        }
    }
}
