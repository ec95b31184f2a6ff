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
    convert::TryFrom,
    fmt,
    fmt::{Display, Formatter},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The byte length of a chunk address
pub const ADDRESS_LENGTH: usize = 32;
/// The maximum number of payload bytes in a chunk
pub const MAX_CHUNK_SIZE: usize = 4096;
/// The proximity order of two identical addresses
pub const MAX_PO: u16 = (ADDRESS_LENGTH * 8) as u16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address length. Expected 32 bytes but got {0}")]
    InvalidLength(usize),
}

/// A 32-byte content address. Used to route chunks, index the push queue and correlate receipts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// A shortened hex representation, used in log messages
    pub fn short_str(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = AddressError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut buf = [0u8; ADDRESS_LENGTH];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short_str())
    }
}

/// Returns the proximity order of two addresses: the number of leading bits they have in common. Identical addresses
/// have a proximity order of [MAX_PO].
pub fn proximity(a: &Address, b: &Address) -> u16 {
    for (i, (x, y)) in a.0.iter().zip(b.0.iter()).enumerate() {
        let diff = x ^ y;
        if diff != 0 {
            return (i * 8) as u16 + diff.leading_zeros() as u16;
        }
    }
    MAX_PO
}

/// A content-addressed chunk. The address is the content hash of the data; it is treated as opaque here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: Address,
    data: Bytes,
}

impl Chunk {
    pub fn new<T: Into<Bytes>>(address: Address, data: T) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr_with(first: u8, second: u8) -> Address {
        let mut buf = [0u8; ADDRESS_LENGTH];
        buf[0] = first;
        buf[1] = second;
        Address::new(buf)
    }

    #[test]
    fn proximity_counts_shared_leading_bits() {
        let a = addr_with(0b1000_0000, 0);
        assert_eq!(proximity(&a, &a), MAX_PO);
        assert_eq!(proximity(&a, &addr_with(0, 0)), 0);
        assert_eq!(proximity(&a, &addr_with(0b1100_0000, 0)), 1);
        assert_eq!(proximity(&a, &addr_with(0b1000_0001, 0)), 7);
        assert_eq!(proximity(&a, &addr_with(0b1000_0000, 0b0010_0000)), 10);
    }

    #[test]
    fn proximity_is_symmetric() {
        let a = addr_with(0x12, 0x34);
        let b = addr_with(0x12, 0x35);
        assert_eq!(proximity(&a, &b), proximity(&b, &a));
        assert_eq!(proximity(&a, &b), 15);
    }

    #[test]
    fn address_from_slice() {
        assert_eq!(
            Address::try_from(&[1u8; 31][..]).unwrap_err(),
            AddressError::InvalidLength(31)
        );
        let addr = Address::try_from(&[7u8; 32][..]).unwrap();
        assert_eq!(addr.as_bytes(), &[7u8; 32]);
        assert_eq!(addr.to_hex().len(), 64);
    }
}
