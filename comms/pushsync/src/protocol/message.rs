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

use std::io;

use bytes::Bytes;
use rand::{rngs::OsRng, RngCore};

use crate::{
    chunk::{Address, ADDRESS_LENGTH, MAX_CHUNK_SIZE},
    protocol::MessageError,
};

pub const NONCE_LENGTH: usize = 32;
pub type Nonce = [u8; NONCE_LENGTH];

/// Draw a nonce from the operating system's secure random source
pub fn fresh_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Deterministic wire encoding. Fixed-width fields are written as-is, variable-width fields are prefixed with their
/// length as a big-endian u32.
pub trait WireEncoding {
    /// Encode to the given writer returning the number of bytes written
    fn wire_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error>;

    /// The exact size of the encoding in bytes
    fn wire_encode_exact_size(&self) -> usize;

    fn to_wire_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::with_capacity(self.wire_encode_exact_size());
        self.wire_encode(&mut buf)?;
        Ok(buf)
    }
}

pub trait WireDecoding: Sized {
    fn wire_decode<R: io::Read>(reader: &mut R) -> Result<Self, io::Error>;

    /// Decode from `bytes`, which must contain exactly one encoded value
    fn from_wire_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = bytes;
        let value = Self::wire_decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(MessageError::TrailingBytes(reader.len()));
        }
        Ok(value)
    }
}

/// A chunk on its way to the neighbourhood of its address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    pub chunk_address: Address,
    pub data: Bytes,
    pub origin: Address,
    pub nonce: Nonce,
}

impl ChunkMessage {
    pub fn new(chunk_address: Address, data: Bytes, origin: Address, nonce: Nonce) -> Self {
        Self {
            chunk_address,
            data,
            origin,
            nonce,
        }
    }
}

impl WireEncoding for ChunkMessage {
    fn wire_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut written = write_fixed(writer, self.chunk_address.as_bytes())?;
        written += write_var(writer, &self.data, MAX_CHUNK_SIZE)?;
        written += write_fixed(writer, self.origin.as_bytes())?;
        written += write_fixed(writer, &self.nonce)?;
        Ok(written)
    }

    fn wire_encode_exact_size(&self) -> usize {
        ADDRESS_LENGTH + 4 + self.data.len() + ADDRESS_LENGTH + NONCE_LENGTH
    }
}

impl WireDecoding for ChunkMessage {
    fn wire_decode<R: io::Read>(reader: &mut R) -> Result<Self, io::Error> {
        let chunk_address = Address::new(read_array(reader)?);
        let data = read_var(reader, MAX_CHUNK_SIZE)?;
        let origin = Address::new(read_array(reader)?);
        let nonce = read_array(reader)?;
        Ok(Self {
            chunk_address,
            data: data.into(),
            origin,
            nonce,
        })
    }
}

/// Acknowledges that a storer has taken custody of a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptMessage {
    pub chunk_address: Address,
    pub nonce: Nonce,
}

impl ReceiptMessage {
    pub fn new(chunk_address: Address, nonce: Nonce) -> Self {
        Self { chunk_address, nonce }
    }
}

impl WireEncoding for ReceiptMessage {
    fn wire_encode<W: io::Write>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let written = write_fixed(writer, self.chunk_address.as_bytes())?;
        Ok(written + write_fixed(writer, &self.nonce)?)
    }

    fn wire_encode_exact_size(&self) -> usize {
        ADDRESS_LENGTH + NONCE_LENGTH
    }
}

impl WireDecoding for ReceiptMessage {
    fn wire_decode<R: io::Read>(reader: &mut R) -> Result<Self, io::Error> {
        let chunk_address = Address::new(read_array(reader)?);
        let nonce = read_array(reader)?;
        Ok(Self { chunk_address, nonce })
    }
}

fn write_fixed<W: io::Write>(writer: &mut W, bytes: &[u8]) -> Result<usize, io::Error> {
    writer.write_all(bytes)?;
    Ok(bytes.len())
}

fn write_var<W: io::Write>(writer: &mut W, bytes: &[u8], max_len: usize) -> Result<usize, io::Error> {
    if bytes.len() > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes exceeds the maximum length of {}", bytes.len(), max_len),
        ));
    }
    let len = bytes.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(bytes)?;
    Ok(4 + bytes.len())
}

fn read_array<R: io::Read, const N: usize>(reader: &mut R) -> Result<[u8; N], io::Error> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_var<R: io::Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, io::Error> {
    let len = u32::from_be_bytes(read_array(reader)?) as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length {} exceeds the maximum of {}", len, max_len),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
