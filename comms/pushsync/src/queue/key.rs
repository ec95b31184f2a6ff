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
    convert::{TryFrom, TryInto},
    fmt,
};

use crate::queue::QueueError;

/// Prefix byte of every queue entry key
pub const ENTRY_PREFIX: u8 = 0x00;
/// Reserved key holding the last issued sequence number
pub const LAST_SEQ_KEY: [u8; 1] = [0x01];
/// Reserved key holding the number of entries in the queue
pub const SIZE_KEY: [u8; 1] = [0x02];
pub const QUEUE_KEY_LENGTH: usize = 9;

/// The slot of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey(u64);

impl QueueKey {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(self) -> u64 {
        self.0
    }

    pub fn to_bytes(self) -> [u8; QUEUE_KEY_LENGTH] {
        let mut buf = [0u8; QUEUE_KEY_LENGTH];
        buf[0] = ENTRY_PREFIX;
        buf[1..].copy_from_slice(&self.0.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, QueueError> {
        if bytes.len() != QUEUE_KEY_LENGTH {
            return Err(QueueError::InvalidKey(format!(
                "expected {} bytes but got {}",
                QUEUE_KEY_LENGTH,
                bytes.len()
            )));
        }
        if bytes[0] != ENTRY_PREFIX {
            return Err(QueueError::InvalidKey(format!("unexpected prefix 0x{:02x}", bytes[0])));
        }
        let seq: [u8; 8] = bytes[1..]
            .try_into()
            .map_err(|_| QueueError::InvalidKey("malformed sequence number".to_string()))?;
        Ok(Self(u64::from_be_bytes(seq)))
    }
}

impl TryFrom<&[u8]> for QueueKey {
    type Error = QueueError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_order_matches_sequence_order() {
        let seqs = [0u64, 1, 255, 256, 65_535, 1 << 40, u64::MAX];
        for pair in seqs.windows(2) {
            assert!(QueueKey::new(pair[0]).to_bytes() < QueueKey::new(pair[1]).to_bytes());
        }
        assert!(QueueKey::new(u64::MAX).to_bytes()[..] < LAST_SEQ_KEY[..]);
        assert!(LAST_SEQ_KEY < SIZE_KEY);
    }

    #[test]
    fn layout() {
        let bytes = QueueKey::new(0x0102).to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(QueueKey::from_bytes(&bytes).unwrap().seq(), 0x0102);
    }

    #[test]
    fn rejects_invalid_keys() {
        assert!(QueueKey::from_bytes(&LAST_SEQ_KEY).is_err());
        let mut bytes = QueueKey::new(1).to_bytes();
        bytes[0] = 0x01;
        assert!(QueueKey::try_from(&bytes[..]).is_err());
    }
}
