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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serializers;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushSyncConfig {
    /// The minimum time between two dispatches of the same chunk. Unacknowledged chunks are retried once per
    /// interval.
    /// Default: 100ms
    #[serde(with = "serializers::milliseconds")]
    pub retry_interval: Duration,
    /// The maximum number of queue entries read from disk in a single scan
    /// Default: 128
    pub scan_batch_size: usize,
    /// The number of loaded chunks that may wait for dispatch. Bounds the chunk payload held in memory.
    /// Default: 16
    pub dispatch_buffer_size: usize,
    /// The number of scan batches buffered between the batch writer and the buffer feeder
    /// Default: 1
    pub items_buffer_size: usize,
    /// The size of the buffer (channel) which holds pending scheduler requests
    /// Default: 100
    pub request_buffer_size: usize,
    /// The size of the buffer (channel) which holds receipted chunk addresses waiting to be applied to the queue
    /// Default: 1000
    pub receipt_buffer_size: usize,
    /// The size of the buffer (channel) which holds inbound chunk messages waiting to be stored
    /// Default: 100
    pub storer_buffer_size: usize,
    /// The time for which an inbound chunk message digest is remembered. Exact replays within this window are
    /// dropped.
    /// Default: 10s
    #[serde(with = "serializers::seconds")]
    pub dedup_ttl: Duration,
    /// The interval at which expired inbound chunk message digests are removed
    /// Default: 10s
    #[serde(with = "serializers::seconds")]
    pub dedup_gc_interval: Duration,
    /// The maximum time to wait for the scheduler to drain on close
    /// Default: 3s
    #[serde(with = "serializers::milliseconds")]
    pub close_timeout: Duration,
}

impl PushSyncConfig {
    /// Default local test configuration
    pub fn default_local_test() -> Self {
        Self {
            retry_interval: Duration::from_millis(50),
            dedup_gc_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }
}

impl Default for PushSyncConfig {
    fn default() -> Self {
        // NB: please remember to update field comments to reflect these defaults
        Self {
            retry_interval: Duration::from_millis(100),
            scan_batch_size: 128,
            dispatch_buffer_size: 16,
            items_buffer_size: 1,
            request_buffer_size: 100,
            receipt_buffer_size: 1000,
            storer_buffer_size: 100,
            dedup_ttl: Duration::from_secs(10),
            dedup_gc_interval: Duration::from_secs(10),
            close_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_deserializes_durations() {
        let config: PushSyncConfig = toml::from_str(
            r#"
            retry_interval = 250
            scan_batch_size = 64
            dispatch_buffer_size = 8
            items_buffer_size = 2
            request_buffer_size = 10
            receipt_buffer_size = 10
            storer_buffer_size = 10
            dedup_ttl = 30
            dedup_gc_interval = 5
            close_timeout = 1500
        "#,
        )
        .unwrap();
        assert_eq!(config.retry_interval, Duration::from_millis(250));
        assert_eq!(config.dedup_ttl, Duration::from_secs(30));
        assert_eq!(config.close_timeout, Duration::from_millis(1500));
        assert_eq!(config.scan_batch_size, 64);
    }

    #[test]
    fn it_rejects_unknown_fields() {
        let mut s = toml::to_string(&PushSyncConfig::default()).unwrap();
        s.push_str("\nnot_a_field = 1\n");
        assert!(toml::from_str::<PushSyncConfig>(&s).is_err());
    }
}
