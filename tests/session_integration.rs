//! Session integration tests
//!
//! Full connection lifecycles over the in-memory transport: registration,
//! inbound dispatch, outbound batching, heartbeats and forced disconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;

use realtime_hub::config::HubConfig;
use realtime_hub::connection::{CloseReason, Connection, ConnectionState};
use realtime_hub::hub::Hub;
use realtime_hub::message::{Envelope, MessageKind, Payload};
use realtime_hub::session::{InboundForwarder, Session, SessionHandle};
use realtime_hub::transport::{Frame, MemoryPeer, MemoryTransport, PeerEvent};

const WAIT: Duration = Duration::from_secs(2);

async fn connect(hub: &Arc<Hub>, user_id: u64) -> (SessionHandle, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let handle = Session::new(hub.clone()).start(user_id, transport).await;
    (handle, peer)
}

/// Read until an envelope of `kind` arrives
async fn expect_kind(peer: &mut MemoryPeer, kind: MessageKind) -> Envelope {
    timeout(WAIT, async {
        loop {
            let batch = peer.recv_envelopes().await.expect("peer closed");
            if let Some(env) = batch.into_iter().find(|e| e.kind() == kind) {
                return env;
            }
        }
    })
    .await
    .expect("timed out waiting for envelope")
}

#[tokio::test]
async fn test_connect_receives_welcome() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;

    let welcome = expect_kind(&mut peer, MessageKind::Success).await;
    match welcome.payload {
        Payload::Success(s) => {
            assert_eq!(s.message, "connected");
            assert_eq!(s.connection_id, Some(handle.connection.id));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert!(hub.is_user_online(1).await);
}

#[tokio::test]
async fn test_subscribe_and_topic_delivery() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.send_text(r#"{"type":"subscribe","data":{"topic":"chat_42"}}"#)
        .await
        .unwrap();
    let ack = expect_kind(&mut peer, MessageKind::Success).await;
    match ack.payload {
        Payload::Success(s) => {
            assert_eq!(s.message, "subscribed");
            assert_eq!(s.topic.as_deref(), Some("chat_42"));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert!(hub
        .subscriptions(handle.connection.id)
        .await
        .unwrap()
        .contains(&"chat_42".to_string()));

    hub.send_to_topic("chat_42", Envelope::notification("hello", ""))
        .await
        .unwrap();
    let received = expect_kind(&mut peer, MessageKind::Notification).await;
    assert_eq!(received.topic.as_deref(), Some("chat_42"));
}

#[tokio::test]
async fn test_protected_topic_rejected_without_disconnect() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.send_text(r#"{"type":"unsubscribe","data":{"topic":"global"}}"#)
        .await
        .unwrap();
    let error = expect_kind(&mut peer, MessageKind::Error).await;
    match error.payload {
        Payload::Error(e) => assert_eq!(e.code, "PROTECTED_TOPIC"),
        other => panic!("unexpected payload {:?}", other),
    }
    assert_eq!(hub.topic_subscribers("global").await, 1);
    assert!(!handle.connection.is_closed());
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.send_text("not json").await.unwrap();
    let error = expect_kind(&mut peer, MessageKind::Error).await;
    assert!(matches!(error.payload, Payload::Error(ref e) if e.code == "INVALID_MESSAGE"));

    peer.send_text(r#"{"type":"teleport","data":{}}"#).await.unwrap();
    expect_kind(&mut peer, MessageKind::Error).await;

    peer.send(Frame::Binary(vec![1, 2, 3])).await.unwrap();
    let error = expect_kind(&mut peer, MessageKind::Error).await;
    assert!(matches!(error.payload, Payload::Error(ref e) if e.code == "UNSUPPORTED_FORMAT"));

    assert!(!handle.connection.is_closed());
    assert_eq!(handle.connection.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_client_heartbeat_answered() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.send_text(r#"{"type":"heartbeat"}"#).await.unwrap();
    let reply = expect_kind(&mut peer, MessageKind::Heartbeat).await;
    assert!(matches!(reply.payload, Payload::Heartbeat));
    assert_eq!(handle.connection.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_chat_relay_to_session_and_recipient() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (_alice, mut alice) = connect(&hub, 1).await;
    let (_bob, mut bob) = connect(&hub, 2).await;
    expect_kind(&mut alice, MessageKind::Success).await;
    expect_kind(&mut bob, MessageKind::Success).await;

    // Bob is addressed directly, not subscribed to the session
    alice
        .send_envelope(&serde_json::from_value(json!({
            "type": "chat",
            "data": {"session_id": "42", "to_user_id": 2, "content": "hi"},
            "from_user_id": 999
        }))
        .unwrap())
        .await
        .unwrap();

    let chat = expect_kind(&mut bob, MessageKind::Chat).await;
    assert_eq!(chat.from_user_id, Some(1));
    assert_eq!(chat.topic.as_deref(), Some("chat_42"));
    assert!(chat.message_id.is_some());
    match chat.payload {
        Payload::Chat(c) => {
            assert_eq!(c.content, "hi");
            assert_eq!(c.message_type, "text");
        }
        other => panic!("unexpected payload {:?}", other),
    }
}

#[tokio::test]
async fn test_typing_relayed_to_session_members() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (_alice, mut alice) = connect(&hub, 1).await;
    let (bob_handle, mut bob) = connect(&hub, 2).await;
    expect_kind(&mut alice, MessageKind::Success).await;
    expect_kind(&mut bob, MessageKind::Success).await;
    hub.subscribe(bob_handle.connection.id, "chat_7").await.unwrap();

    alice
        .send_text(r#"{"type":"typing","data":{"session_id":"7","is_typing":true}}"#)
        .await
        .unwrap();

    let typing = expect_kind(&mut bob, MessageKind::Typing).await;
    assert_eq!(typing.from_user_id, Some(1));
}

struct Recorder {
    seen: Mutex<Vec<Envelope>>,
}

#[async_trait]
impl InboundForwarder for Recorder {
    async fn forward(&self, _from: &Connection, envelope: Envelope) {
        self.seen.lock().await.push(envelope);
    }
}

#[tokio::test]
async fn test_unrouted_kinds_forwarded() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    let (transport, mut peer) = MemoryTransport::pair();
    let _handle = Session::new(hub.clone())
        .with_forwarder(recorder.clone())
        .start(5, transport)
        .await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.send_text(r#"{"type":"product_view","data":{"product_id":"p-1"}}"#)
        .await
        .unwrap();

    timeout(WAIT, async {
        loop {
            if !recorder.seen.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let seen = recorder.seen.lock().await;
    assert_eq!(seen[0].kind(), MessageKind::ProductView);
    assert_eq!(seen[0].from_user_id, Some(5));
}

#[tokio::test]
async fn test_peer_hang_up_deregisters() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    peer.hang_up();
    let conn = handle.connection.clone();
    let reason = timeout(WAIT, handle.wait()).await.unwrap();

    assert_eq!(reason, Some(CloseReason::PeerClosed));
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!hub.is_user_online(1).await);
}

#[tokio::test]
async fn test_hub_deregister_stops_session() {
    let (hub, _coordinator) = Hub::new(HubConfig::default());
    let (handle, mut peer) = connect(&hub, 1).await;
    expect_kind(&mut peer, MessageKind::Success).await;

    assert!(hub.deregister(handle.connection.id).await);
    let reason = timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(reason, None);
}

#[tokio::test]
async fn test_heartbeat_and_silence_timeout() {
    let config = HubConfig {
        heartbeat_interval_ms: 20,
        connection_timeout_ms: 60,
        ..Default::default()
    };
    let (hub, _coordinator) = Hub::new(config);
    let (handle, mut peer) = connect(&hub, 1).await;

    // Pings keep flowing while the peer stays silent, then the session ends
    let mut pings = 0;
    let result = timeout(WAIT, async {
        while let Some(event) = peer.recv().await {
            match event {
                PeerEvent::Ping => pings += 1,
                PeerEvent::Closed => break,
                PeerEvent::Batch(_) => {}
            }
        }
    })
    .await;
    assert!(result.is_ok());
    assert!(pings >= 1);

    let reason = timeout(WAIT, handle.wait()).await.unwrap();
    assert_eq!(reason, Some(CloseReason::HeartbeatTimeout));
    assert!(!hub.is_user_online(1).await);
}

#[tokio::test]
async fn test_stalled_peer_dropped_without_blocking_others() {
    let config = HubConfig {
        outbound_queue_capacity: 4,
        ..Default::default()
    };
    let (hub, _coordinator) = Hub::new(config);

    // Peer never reads and its transport buffer is tiny
    let (transport, _stalled_peer) = MemoryTransport::pair_with_buffer(1);
    let stalled = Session::new(hub.clone()).start(2, transport).await;
    let (_healthy, mut healthy_peer) = connect(&hub, 1).await;
    expect_kind(&mut healthy_peer, MessageKind::Success).await;

    for i in 0..50 {
        hub.send_to_topic("global", Envelope::notification(format!("{}", i), ""))
            .await
            .unwrap();
        // Let the healthy pump drain its queue
        if i % 2 == 1 {
            tokio::task::yield_now().await;
            while let Ok(Some(_)) =
                timeout(Duration::from_millis(20), healthy_peer.recv()).await
            {}
        }
    }

    let reason = timeout(WAIT, stalled.wait()).await.unwrap();
    assert_eq!(reason, None);
    assert!(!hub.is_user_online(2).await);
    assert!(hub.is_user_online(1).await);
}

#[tokio::test]
async fn test_broadcast_through_coordinator() {
    let (hub, coordinator) = Hub::new(HubConfig::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(coordinator.run(shutdown_rx));

    let (_a, mut peer_a) = connect(&hub, 1).await;
    let (_b, mut peer_b) = connect(&hub, 2).await;

    hub.broadcast_all(Envelope::notification("sale", "")).unwrap();

    for peer in [&mut peer_a, &mut peer_b] {
        let env = expect_kind(peer, MessageKind::Notification).await;
        assert_eq!(env.topic.as_deref(), Some("global"));
    }

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}
