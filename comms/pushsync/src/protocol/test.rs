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

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tari_test_utils::async_assert_eventually;
use tokio::{sync::mpsc, time};

use crate::{
    chunk::{Address, Chunk},
    chunk_store::{ChunkStore, MemoryChunkStore},
    config::PushSyncConfig,
    protocol::{
        fresh_nonce,
        ChunkMessage,
        Dispatcher,
        ReceiptMessage,
        Storer,
        WireDecoding,
        WireEncoding,
        TOPIC_CHUNK,
        TOPIC_RECEIPT,
    },
    pubsub::PeerHandle,
    test_utils::{address_with_index, create_pubsub_mock, random_chunk, MockOverlay, MockPubSubState},
};

const BASE: Address = Address::new([0xaa; 32]);
const REMOTE: Address = Address::new([0xbb; 32]);

fn encoded_chunk_message(chunk: &Chunk, origin: Address) -> Bytes {
    ChunkMessage::new(*chunk.address(), chunk.data().clone(), origin, fresh_nonce())
        .to_wire_bytes()
        .unwrap()
        .into()
}

mod dispatcher {
    use super::*;

    #[tokio::test]
    async fn it_sends_chunk_messages_to_the_chunk_address() {
        let (pubsub, state) = create_pubsub_mock(BASE);
        let (receipt_tx, _receipt_rx) = mpsc::channel(10);
        let dispatcher = Dispatcher::new(pubsub, receipt_tx).unwrap();

        let chunk = random_chunk(address_with_index(1));
        dispatcher.send(&chunk).await.unwrap();
        dispatcher.send(&chunk).await.unwrap();

        let sent = state.sent_on(TOPIC_CHUNK);
        assert_eq!(sent.len(), 2);
        let first = ChunkMessage::from_wire_bytes(&sent[0].msg).unwrap();
        let second = ChunkMessage::from_wire_bytes(&sent[1].msg).unwrap();
        assert_eq!(sent[0].destination, *chunk.address());
        assert_eq!(first.chunk_address, *chunk.address());
        assert_eq!(first.origin, BASE);
        assert_eq!(&first.data, chunk.data());
        // Each retransmission is distinct
        assert_ne!(first.nonce, second.nonce);
    }

    #[tokio::test]
    async fn it_forwards_receipts() {
        let (pubsub, state) = create_pubsub_mock(BASE);
        let (receipt_tx, mut receipt_rx) = mpsc::channel(10);
        let _dispatcher = Dispatcher::new(pubsub, receipt_tx).unwrap();
        assert_eq!(state.is_proximity_addressed(TOPIC_RECEIPT), Some(false));

        let receipt = ReceiptMessage::new(address_with_index(7), fresh_nonce());
        state
            .deliver(
                TOPIC_RECEIPT,
                receipt.to_wire_bytes().unwrap().into(),
                &PeerHandle::new(REMOTE),
            )
            .unwrap();
        assert_eq!(receipt_rx.recv().await.unwrap(), address_with_index(7));
    }

    #[tokio::test]
    async fn it_discards_malformed_receipts() {
        let (pubsub, state) = create_pubsub_mock(BASE);
        let (receipt_tx, mut receipt_rx) = mpsc::channel(10);
        let _dispatcher = Dispatcher::new(pubsub, receipt_tx).unwrap();

        state
            .deliver(TOPIC_RECEIPT, Bytes::from_static(b"garbage"), &PeerHandle::default())
            .unwrap();
        assert!(receipt_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn it_surfaces_send_failures() {
        let (pubsub, state) = create_pubsub_mock(BASE);
        let (receipt_tx, _receipt_rx) = mpsc::channel(10);
        let dispatcher = Dispatcher::new(pubsub, receipt_tx).unwrap();
        state.set_fail_sends(true);
        assert!(dispatcher.send(&random_chunk(address_with_index(1))).await.is_err());
        assert_eq!(state.call_count(), 0);
    }

    #[tokio::test]
    async fn close_deregisters_the_receipt_handler() {
        let (pubsub, state) = create_pubsub_mock(BASE);
        let (receipt_tx, _receipt_rx) = mpsc::channel(10);
        let dispatcher = Dispatcher::new(pubsub.clone(), receipt_tx.clone()).unwrap();
        assert!(state.is_registered(TOPIC_RECEIPT));
        // Only one handler per topic
        assert!(Dispatcher::new(pubsub, receipt_tx).is_err());
        dispatcher.close();
        assert!(!state.is_registered(TOPIC_RECEIPT));
    }
}

mod storer {
    use super::*;

    struct TestStorer {
        storer: Storer,
        state: MockPubSubState,
        chunk_store: Arc<MemoryChunkStore>,
        overlay: Arc<MockOverlay>,
        local_receipts: mpsc::Receiver<Address>,
    }

    fn setup() -> TestStorer {
        setup_with_config(PushSyncConfig::default_local_test())
    }

    fn setup_with_config(config: PushSyncConfig) -> TestStorer {
        let _ = env_logger::try_init();
        let (pubsub, state) = create_pubsub_mock(BASE);
        let chunk_store = Arc::new(MemoryChunkStore::new());
        let overlay = Arc::new(MockOverlay::new(0));
        let (local_tx, local_receipts) = mpsc::channel(10);
        let storer = Storer::spawn(
            &config,
            pubsub,
            chunk_store.clone(),
            overlay.clone(),
            local_tx,
        )
        .unwrap();
        TestStorer {
            storer,
            state,
            chunk_store,
            overlay,
            local_receipts,
        }
    }

    #[tokio::test]
    async fn it_stores_chunks_and_replies_to_the_origin() {
        let t = setup();
        assert_eq!(t.state.is_proximity_addressed(TOPIC_CHUNK), Some(true));
        let chunk = random_chunk(address_with_index(3));
        t.state
            .deliver(
                TOPIC_CHUNK,
                encoded_chunk_message(&chunk, REMOTE),
                &PeerHandle::new(REMOTE),
            )
            .unwrap();

        let sent = t.state.await_call_count(1, Duration::from_secs(5)).await;
        assert_eq!(sent[0].topic, TOPIC_RECEIPT);
        assert_eq!(sent[0].destination, REMOTE);
        let receipt = ReceiptMessage::from_wire_bytes(&sent[0].msg).unwrap();
        assert_eq!(receipt.chunk_address, *chunk.address());
        assert_eq!(t.chunk_store.get(chunk.address()).await.unwrap(), chunk);
    }

    #[tokio::test]
    async fn it_runs_with_a_zero_buffer_size_and_gc_interval() {
        let t = setup_with_config(PushSyncConfig {
            storer_buffer_size: 0,
            dedup_gc_interval: Duration::ZERO,
            ..PushSyncConfig::default_local_test()
        });
        let chunk = random_chunk(address_with_index(7));
        t.state
            .deliver(
                TOPIC_CHUNK,
                encoded_chunk_message(&chunk, REMOTE),
                &PeerHandle::new(REMOTE),
            )
            .unwrap();

        let sent = t.state.await_call_count(1, Duration::from_secs(5)).await;
        assert_eq!(sent[0].topic, TOPIC_RECEIPT);
        t.storer.close().await;
        assert!(!t.state.is_registered(TOPIC_CHUNK));
    }

    #[tokio::test]
    async fn it_uses_the_local_receipt_sink_for_own_chunks() {
        let mut t = setup();
        let chunk = random_chunk(address_with_index(4));
        t.state
            .deliver(TOPIC_CHUNK, encoded_chunk_message(&chunk, BASE), &PeerHandle::new(BASE))
            .unwrap();

        let address = time::timeout(Duration::from_secs(5), t.local_receipts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(address, *chunk.address());
        assert_eq!(t.state.call_count(), 0);
    }

    #[tokio::test]
    async fn it_does_not_reply_if_a_closer_peer_exists() {
        let t = setup();
        t.overlay.set_closer_peer_exists(true);
        let chunk = random_chunk(address_with_index(5));
        t.state
            .deliver(
                TOPIC_CHUNK,
                encoded_chunk_message(&chunk, REMOTE),
                &PeerHandle::new(REMOTE),
            )
            .unwrap();

        async_assert_eventually!(
            t.chunk_store.contains(chunk.address()),
            expect = true,
            max_attempts = 50,
            interval = Duration::from_millis(10)
        );
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(t.state.call_count(), 0);
    }

    #[tokio::test]
    async fn it_drops_replayed_messages_but_not_retransmissions() {
        let t = setup();
        let chunk = random_chunk(address_with_index(6));
        let msg = encoded_chunk_message(&chunk, REMOTE);
        let peer = PeerHandle::new(REMOTE);

        t.state.deliver(TOPIC_CHUNK, msg.clone(), &peer).unwrap();
        t.state.deliver(TOPIC_CHUNK, msg, &peer).unwrap();
        t.state.await_call_count(1, Duration::from_secs(5)).await;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(t.state.call_count(), 1);

        // A retransmission carries a fresh nonce. The chunk is already stored but a new receipt is sent.
        t.state
            .deliver(TOPIC_CHUNK, encoded_chunk_message(&chunk, REMOTE), &peer)
            .unwrap();
        t.state.await_call_count(2, Duration::from_secs(5)).await;
        assert_eq!(t.chunk_store.len(), 1);
    }

    #[tokio::test]
    async fn it_does_not_reply_if_the_chunk_cannot_be_stored() {
        let t = setup();
        t.chunk_store.close().await.unwrap();
        let chunk = random_chunk(address_with_index(8));
        t.state
            .deliver(
                TOPIC_CHUNK,
                encoded_chunk_message(&chunk, REMOTE),
                &PeerHandle::new(REMOTE),
            )
            .unwrap();
        t.state
            .deliver(TOPIC_CHUNK, Bytes::from_static(b"garbage"), &PeerHandle::new(REMOTE))
            .unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(t.state.call_count(), 0);
    }

    #[tokio::test]
    async fn close_deregisters_the_chunk_handler() {
        let t = setup();
        assert!(t.state.is_registered(TOPIC_CHUNK));
        t.storer.close().await;
        assert!(!t.state.is_registered(TOPIC_CHUNK));
        // Closing twice is fine
        t.storer.close().await;
    }
}
