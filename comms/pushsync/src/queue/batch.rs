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

use tari_storage::WriteBatch;

use crate::{
    chunk::Address,
    queue::{QueueKey, LAST_SEQ_KEY, SIZE_KEY},
};

/// Queue mutations accumulated between two commits
#[derive(Debug, Default)]
pub struct StoreBatch {
    writes: WriteBatch,
    last_seq: Option<u64>,
    size: Option<u64>,
    deleted: Vec<(Address, QueueKey)>,
    num_enqueued: usize,
}

impl StoreBatch {
    pub fn new() -> Self {
        Default::default()
    }

    pub(super) fn put_entry(&mut self, key: QueueKey, value: Vec<u8>, last_seq: u64) {
        self.writes.put(key.to_bytes().to_vec(), value);
        self.last_seq = Some(last_seq);
        self.num_enqueued += 1;
    }

    /// Stage a delete of the slot `key`. `address` is removed from the waiting index once the delete is durable.
    pub(super) fn delete_entry(&mut self, address: Address, key: QueueKey) {
        self.writes.delete(key.to_bytes().to_vec());
        self.deleted.push((address, key));
    }

    pub(super) fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    /// The queue size this batch records, if it changes it
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn num_enqueued(&self) -> usize {
        self.num_enqueued
    }

    pub fn deleted(&self) -> &[(Address, QueueKey)] {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.last_seq.is_none() && self.size.is_none()
    }

    /// Convert into a write batch, with the reserved counters written last
    pub(super) fn into_parts(self) -> (WriteBatch, Vec<(Address, QueueKey)>) {
        let Self {
            mut writes,
            last_seq,
            size,
            deleted,
            ..
        } = self;
        if let Some(last_seq) = last_seq {
            writes.put(LAST_SEQ_KEY.to_vec(), last_seq.to_be_bytes().to_vec());
        }
        if let Some(size) = size {
            writes.put(SIZE_KEY.to_vec(), size.to_be_bytes().to_vec());
        }
        (writes, deleted)
    }
}

#[cfg(test)]
mod test {
    use tari_storage::WriteOperation;

    use super::*;

    #[test]
    fn counters_are_written_last() {
        let mut batch = StoreBatch::new();
        assert!(batch.is_empty());
        batch.put_entry(QueueKey::new(1), vec![1], 1);
        batch.set_size(1);
        batch.delete_entry(Address::new([1; 32]), QueueKey::new(1));
        batch.set_size(0);
        assert_eq!(batch.num_enqueued(), 1);
        assert_eq!(batch.size(), Some(0));

        let (writes, deleted) = batch.into_parts();
        assert_eq!(deleted.len(), 1);
        let ops = writes.into_operations();
        assert_eq!(ops.len(), 4);
        assert_eq!(ops[2], WriteOperation::Put {
            key: LAST_SEQ_KEY.to_vec(),
            value: 1u64.to_be_bytes().to_vec(),
        });
        assert_eq!(ops[3], WriteOperation::Put {
            key: SIZE_KEY.to_vec(),
            value: 0u64.to_be_bytes().to_vec(),
        });
    }
}
