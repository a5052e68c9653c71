//! Integration tests for end-to-end WebSocket collaboration.
//!
//! These tests start a real server and connect real clients,
//! verifying the full sync pipeline.

use futures_util::{SinkExt, StreamExt};
use scribe_collab::client::{ConnectionState, SyncClient, SyncEvent};
use scribe_collab::protocol::{PeerInfo, SyncMessage};
use scribe_collab::server::{ServerConfig, SyncServer};
use scribe_ot::{Op, Update, UpdateMeta};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type RawSocket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a server on a free port, return it with the port.
async fn start_test_server() -> (Arc<SyncServer>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_capacity: 64,
        ..ServerConfig::default()
    };
    let server = Arc::new(SyncServer::with_store(
        config,
        Arc::new(scribe_collab::storage::MemoryStore::new()),
    ));
    let serving = server.clone();
    tokio::spawn(async move {
        serving.serve(listener).await.unwrap();
    });
    (server, port)
}

async fn raw_connect(port: u16) -> RawSocket {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .expect("Should connect to server");
    ws
}

async fn send(ws: &mut RawSocket, msg: SyncMessage) {
    ws.send(Message::Binary(msg.encode().unwrap().into())).await.unwrap();
}

/// Next protocol message, skipping non-binary frames.
async fn recv(ws: &mut RawSocket) -> SyncMessage {
    timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => {
                    let bytes: Vec<u8> = data.into();
                    return SyncMessage::decode(&bytes).unwrap();
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {other:?}"),
            }
        }
    })
    .await
    .expect("Timed out waiting for server message")
}

async fn raw_join(ws: &mut RawSocket, doc_id: Uuid, peer: &PeerInfo) -> u64 {
    send(
        ws,
        SyncMessage::JoinDoc {
            doc_id,
            peer: peer.clone(),
            from_version: None,
        },
    )
    .await;
    match recv(ws).await {
        SyncMessage::JoinedDoc { version, .. } => version,
        other => panic!("expected JoinedDoc, got {other:?}"),
    }
}

async fn wait_for(rx: &mut mpsc::Receiver<SyncEvent>, pred: impl Fn(&SyncEvent) -> bool) -> SyncEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

async fn wait_until(cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Condition not reached in time")
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let (_server, port) = start_test_server().await;
    let result = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}")).await;
    assert!(result.is_ok(), "Should connect to server");
}

#[tokio::test]
async fn test_ping_pong() {
    let (_server, port) = start_test_server().await;
    let mut ws = raw_connect(port).await;
    send(&mut ws, SyncMessage::Ping).await;
    assert_eq!(recv(&mut ws).await, SyncMessage::Pong);
}

#[tokio::test]
async fn test_ack_to_originator_update_to_others() {
    let (server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    let alice = PeerInfo::new("Alice");
    let bob = PeerInfo::new("Bob");

    let mut ws_a = raw_connect(port).await;
    let mut ws_b = raw_connect(port).await;
    assert_eq!(raw_join(&mut ws_a, doc_id, &alice).await, 0);
    assert_eq!(raw_join(&mut ws_b, doc_id, &bob).await, 0);

    let update = Update::single(doc_id, 0, Op::insert(0, "hello"), UpdateMeta::new(None));
    send(&mut ws_a, SyncMessage::ApplyUpdate(update)).await;

    assert_eq!(recv(&mut ws_a).await, SyncMessage::Ack { doc_id, version: 1 });
    match recv(&mut ws_b).await {
        SyncMessage::UpdateApplied(applied) => {
            assert_eq!(applied.version, 0);
            assert_eq!(applied.ops, vec![Op::insert(0, "hello")]);
            // Stamped with the originating connection
            assert_eq!(applied.meta.source, Some(alice.peer_id));
        }
        other => panic!("expected UpdateApplied, got {other:?}"),
    }

    let snapshot = server.registry().get_snapshot(doc_id).await.unwrap();
    assert_eq!(snapshot.content(), "hello");
    assert_eq!(snapshot.version, 1);
}

#[tokio::test]
async fn test_retransmission_acked_once_applied_once() {
    let (server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    let alice = PeerInfo::new("Alice");
    let mut ws_a = raw_connect(port).await;
    let mut ws_b = raw_connect(port).await;
    raw_join(&mut ws_a, doc_id, &alice).await;
    raw_join(&mut ws_b, doc_id, &PeerInfo::new("Bob")).await;

    let update = Update::single(doc_id, 0, Op::insert(0, "x"), UpdateMeta::new(None));
    send(&mut ws_a, SyncMessage::ApplyUpdate(update.clone())).await;
    assert_eq!(recv(&mut ws_a).await, SyncMessage::Ack { doc_id, version: 1 });

    // Ack "lost": resend the same update marked as a possible duplicate
    send(&mut ws_a, SyncMessage::ApplyUpdate(update.with_dup_if_source(alice.peer_id))).await;
    assert_eq!(recv(&mut ws_a).await, SyncMessage::Ack { doc_id, version: 1 });

    // Bob saw exactly one update; the next thing he sees is his own ping reply
    assert!(matches!(recv(&mut ws_b).await, SyncMessage::UpdateApplied(_)));
    send(&mut ws_b, SyncMessage::Ping).await;
    assert_eq!(recv(&mut ws_b).await, SyncMessage::Pong);

    let snapshot = server.registry().get_snapshot(doc_id).await.unwrap();
    assert_eq!(snapshot.content(), "x");
    assert_eq!(snapshot.version, 1);
}

#[tokio::test]
async fn test_version_ahead_rejected_with_resync() {
    let (server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    let mut ws = raw_connect(port).await;
    raw_join(&mut ws, doc_id, &PeerInfo::new("Alice")).await;

    let update = Update::single(doc_id, 5, Op::insert(0, "x"), UpdateMeta::new(None));
    send(&mut ws, SyncMessage::ApplyUpdate(update)).await;
    match recv(&mut ws).await {
        SyncMessage::UpdateError { doc_id: d, resync, .. } => {
            assert_eq!(d, doc_id);
            assert!(resync);
        }
        other => panic!("expected UpdateError, got {other:?}"),
    }

    // Messages are handled in order, so the rejection is counted by the time Pong arrives
    send(&mut ws, SyncMessage::Ping).await;
    assert_eq!(recv(&mut ws).await, SyncMessage::Pong);

    assert_eq!(server.registry().get_snapshot(doc_id).await.unwrap().version, 0);
    assert_eq!(server.stats().await.updates_rejected, 1);
}

#[tokio::test]
async fn test_update_without_join_rejected() {
    let (_server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    let mut ws = raw_connect(port).await;

    let update = Update::single(doc_id, 0, Op::insert(0, "x"), UpdateMeta::new(None));
    send(&mut ws, SyncMessage::ApplyUpdate(update)).await;
    assert!(matches!(recv(&mut ws).await, SyncMessage::UpdateError { resync: true, .. }));
}

#[tokio::test]
async fn test_join_with_catch_up() {
    let (server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    for (v, text) in ["a", "b", "c"].into_iter().enumerate() {
        let update = Update::single(doc_id, v as u64, Op::insert(v, text), UpdateMeta::new(None));
        server.registry().submit(update).await.unwrap();
    }

    let mut ws = raw_connect(port).await;
    send(
        &mut ws,
        SyncMessage::JoinDoc {
            doc_id,
            peer: PeerInfo::new("Late"),
            from_version: Some(1),
        },
    )
    .await;
    match recv(&mut ws).await {
        SyncMessage::JoinedDoc { lines, version, updates, .. } => {
            assert_eq!(lines, vec!["abc".to_string()]);
            assert_eq!(version, 3);
            let versions: Vec<u64> = updates.iter().map(|u| u.version).collect();
            assert_eq!(versions, vec![1, 2]);
        }
        other => panic!("expected JoinedDoc, got {other:?}"),
    }
}

#[tokio::test]
async fn test_clients_converge() {
    let (server, port) = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");
    let doc_id = Uuid::new_v4();

    let mut alice = SyncClient::new(PeerInfo::new("Alice"), doc_id, &url);
    let mut bob = SyncClient::new(PeerInfo::new("Bob"), doc_id, &url);
    let mut alice_rx = alice.take_event_rx().unwrap();
    let mut bob_rx = bob.take_event_rx().unwrap();

    alice.connect().await.unwrap();
    bob.connect().await.unwrap();
    assert_eq!(alice.connection_state().await, ConnectionState::Connected);
    wait_for(&mut alice_rx, |e| matches!(e, SyncEvent::Joined { .. })).await;
    wait_for(&mut bob_rx, |e| matches!(e, SyncEvent::Joined { .. })).await;

    alice.apply_local(vec![Op::insert(0, "hello")]).await.unwrap();
    wait_for(&mut alice_rx, |e| matches!(e, SyncEvent::Acked { version: 1 })).await;
    wait_for(&mut bob_rx, |e| matches!(e, SyncEvent::RemoteUpdate(_))).await;
    assert_eq!(bob.content(), "hello");

    // Concurrent edits from both sides, several in a row
    alice.apply_local(vec![Op::insert(5, " world")]).await.unwrap();
    bob.apply_local(vec![Op::insert(0, ">> ")]).await.unwrap();
    alice.apply_local(vec![Op::insert(11, "!")]).await.unwrap();
    bob.apply_local(vec![Op::delete(3, "h")]).await.unwrap();

    let expected = ">> ello world!";
    wait_until(|| {
        !alice.has_unacked() && !bob.has_unacked() && alice.content() == expected && bob.content() == expected
    })
    .await;

    let snapshot = server.registry().get_snapshot(doc_id).await.unwrap();
    assert_eq!(snapshot.content(), expected);
    wait_until(|| alice.version() == snapshot.version && bob.version() == snapshot.version).await;
}

#[tokio::test]
async fn test_client_reconnect_rejoins() {
    let (server, port) = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");
    let doc_id = Uuid::new_v4();
    server
        .registry()
        .submit(Update::single(doc_id, 0, Op::insert(0, "saved"), UpdateMeta::new(None)))
        .await
        .unwrap();

    let mut client = SyncClient::new(PeerInfo::new("Alice"), doc_id, &url);
    let mut rx = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    wait_for(&mut rx, |e| matches!(e, SyncEvent::Joined { version: 1 })).await;
    assert_eq!(client.content(), "saved");

    client.disconnect().await;
    assert_eq!(client.connection_state().await, ConnectionState::Disconnected);

    // Edits made while offline are discarded by the rejoin
    client.apply_local(vec![Op::insert(0, "draft ")]).await.unwrap();
    client.reconnect().await.unwrap();
    wait_for(&mut rx, |e| matches!(e, SyncEvent::Joined { version: 1 })).await;
    assert_eq!(client.content(), "saved");
    assert!(!client.has_unacked());
}

#[tokio::test]
async fn test_server_stats_after_disconnect() {
    let (server, port) = start_test_server().await;
    let doc_id = Uuid::new_v4();
    {
        let mut ws = raw_connect(port).await;
        raw_join(&mut ws, doc_id, &PeerInfo::new("Alice")).await;
        assert_eq!(server.room_manager().room_count(), 1);
        ws.close(None).await.unwrap();
    }

    let rooms = server.room_manager().clone();
    wait_until(move || rooms.room_count() == 0).await;
    let stats = server.stats().await;
    assert_eq!(stats.total_connections, 1);
    // The document stays registered after its room is gone
    assert_eq!(server.registry().get_snapshot(doc_id).await.unwrap().version, 0);
}
