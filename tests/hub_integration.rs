//! Hub integration tests
//!
//! Drive the hub through its public API with bare connection handles and
//! inspect what lands on each outbound queue.

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;

use realtime_hub::config::HubConfig;
use realtime_hub::connection::{Connection, ConnectionState};
use realtime_hub::error::HubError;
use realtime_hub::hub::{Hub, GLOBAL_TOPIC};
use realtime_hub::message::{Envelope, MessageKind, OutboundMessage, Payload};

fn hub() -> Arc<Hub> {
    Hub::new(HubConfig::default()).0
}

fn drain(rx: &mut Receiver<OutboundMessage>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message.decode().unwrap());
    }
    out
}

fn count_kind(envelopes: &[Envelope], kind: MessageKind) -> usize {
    envelopes.iter().filter(|e| e.kind() == kind).count()
}

fn presence_for(envelopes: &[Envelope], kind: MessageKind, user_id: u64) -> usize {
    envelopes
        .iter()
        .filter(|e| match &e.payload {
            Payload::UserOnline(p) if kind == MessageKind::UserOnline => p.user_id == user_id,
            Payload::UserOffline(p) if kind == MessageKind::UserOffline => p.user_id == user_id,
            _ => false,
        })
        .count()
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let hub = hub();

    // User B connects first so it observes A's presence changes
    let (c3, mut r3) = Connection::new(2, 64);
    hub.register(c3.clone()).await;

    let (c1, mut r1) = Connection::new(1, 64);
    let (c2, mut r2) = Connection::new(1, 64);
    hub.register(c1.clone()).await;
    hub.register(c2.clone()).await;

    let b_seen = drain(&mut r3);
    assert_eq!(presence_for(&b_seen, MessageKind::UserOnline, 1), 1);
    drain(&mut r1);
    drain(&mut r2);

    // SendToUser(A) reaches both of A's connections and not B
    let report = hub
        .send_to_user(1, Envelope::notification("Order shipped", ""))
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(count_kind(&drain(&mut r1), MessageKind::Notification), 1);
    assert_eq!(count_kind(&drain(&mut r2), MessageKind::Notification), 1);
    assert!(drain(&mut r3).is_empty());

    // Topic delivery reaches only the subscriber
    hub.subscribe(c3.id, "chat_42").await.unwrap();
    let report = hub
        .send_to_topic("chat_42", Envelope::notification("msg", ""))
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(count_kind(&drain(&mut r3), MessageKind::Notification), 1);
    assert!(drain(&mut r1).is_empty());
    assert!(drain(&mut r2).is_empty());

    // A goes offline exactly once, after its last connection leaves
    assert!(hub.deregister(c1.id).await);
    assert!(hub.is_user_online(1).await);
    assert_eq!(presence_for(&drain(&mut r3), MessageKind::UserOffline, 1), 0);

    assert!(hub.deregister(c2.id).await);
    assert!(!hub.is_user_online(1).await);
    assert_eq!(presence_for(&drain(&mut r3), MessageKind::UserOffline, 1), 1);

    assert_eq!(hub.connected_users().await, vec![2]);
}

#[tokio::test]
async fn test_connected_users_tracks_registrations() {
    let hub = hub();
    let (a, _ra) = Connection::new(10, 8);
    let (b, _rb) = Connection::new(10, 8);

    assert!(hub.connected_users().await.is_empty());
    hub.register(a.clone()).await;
    assert_eq!(hub.connected_users().await, vec![10]);
    hub.register(b.clone()).await;
    assert_eq!(hub.user_connection_count(10).await, 2);

    hub.deregister(a.id).await;
    assert_eq!(hub.connected_users().await, vec![10]);
    hub.deregister(b.id).await;
    assert!(hub.connected_users().await.is_empty());
}

#[tokio::test]
async fn test_topic_delivery_exactly_once_per_call() {
    let hub = hub();
    let (conn, mut rx) = Connection::new(1, 64);
    hub.register(conn.clone()).await;
    hub.subscribe(conn.id, "order_7").await.unwrap();
    // Repeated subscribe does not duplicate membership
    hub.subscribe(conn.id, "order_7").await.unwrap();
    drain(&mut rx);

    for _ in 0..3 {
        hub.send_to_topic("order_7", Envelope::notification("n", ""))
            .await
            .unwrap();
    }
    assert_eq!(drain(&mut rx).len(), 3);

    hub.unsubscribe(conn.id, "order_7").await.unwrap();
    hub.send_to_topic("order_7", Envelope::notification("n", ""))
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_double_deregister_single_offline() {
    let hub = hub();
    let (observer, mut observer_rx) = Connection::new(1, 64);
    let (leaving, _rx) = Connection::new(2, 8);
    hub.register(observer).await;
    hub.register(leaving.clone()).await;
    drain(&mut observer_rx);

    assert!(hub.deregister(leaving.id).await);
    assert!(!hub.deregister(leaving.id).await);

    let seen = drain(&mut observer_rx);
    assert_eq!(presence_for(&seen, MessageKind::UserOffline, 2), 1);
    assert_eq!(leaving.state(), ConnectionState::Closed);
    assert!(hub.subscriptions(leaving.id).await.is_none());
}

#[tokio::test]
async fn test_slow_consumer_isolation() {
    let hub = hub();
    let (healthy, mut healthy_rx) = Connection::new(1, 256);
    let (stalled, _stalled_rx) = Connection::new(2, 4);
    hub.register(healthy.clone()).await;
    hub.register(stalled.clone()).await;
    hub.subscribe(healthy.id, "product_view").await.unwrap();
    hub.subscribe(stalled.id, "product_view").await.unwrap();
    drain(&mut healthy_rx);

    for i in 0..20 {
        hub.send_to_topic("product_view", Envelope::notification(format!("{}", i), ""))
            .await
            .unwrap();
    }

    // The stalled connection is gone from every index
    assert!(stalled.is_closed());
    assert!(hub.connection(stalled.id).await.is_none());
    assert_eq!(hub.topic_subscribers("product_view").await, 1);
    assert!(!hub.is_user_online(2).await);

    // The healthy one saw every message, in order
    let titles: Vec<String> = drain(&mut healthy_rx)
        .into_iter()
        .filter_map(|e| match e.payload {
            Payload::Notification(n) => Some(n.title),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn test_recipients_receive_identical_frames() {
    let hub = hub();
    let (a, mut ra) = Connection::new(1, 16);
    let (b, mut rb) = Connection::new(2, 16);
    hub.register(a.clone()).await;
    hub.register(b.clone()).await;
    drain(&mut ra);
    drain(&mut rb);

    hub.send_to_topic(GLOBAL_TOPIC, Envelope::notification("all", ""))
        .await
        .unwrap();

    let ma = ra.try_recv().unwrap();
    let mb = rb.try_recv().unwrap();
    assert_eq!(ma.as_str(), mb.as_str());
}

#[tokio::test]
async fn test_routing_errors_do_not_affect_others() {
    let hub = hub();
    let (conn, mut rx) = Connection::new(1, 16);
    hub.register(conn).await;
    drain(&mut rx);

    assert!(matches!(
        hub.send_to_user(404, Envelope::notification("x", "")).await,
        Err(HubError::NoRecipients { .. })
    ));
    hub.send_to_user(1, Envelope::notification("y", ""))
        .await
        .unwrap();
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_concurrent_senders_and_churn() {
    let hub = hub();
    let (observer, mut observer_rx) = Connection::new(1, 4096);
    hub.register(observer.clone()).await;
    hub.subscribe(observer.id, "chat_load").await.unwrap();
    drain(&mut observer_rx);

    let mut tasks = Vec::new();
    for user in 100..110u64 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let (conn, _rx) = Connection::new(user, 1024);
            hub.register(conn.clone()).await;
            for _ in 0..10 {
                hub.send_to_topic("chat_load", Envelope::notification("m", ""))
                    .await
                    .unwrap();
            }
            hub.deregister(conn.id).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let seen = drain(&mut observer_rx);
    assert_eq!(count_kind(&seen, MessageKind::Notification), 100);
    assert_eq!(count_kind(&seen, MessageKind::UserOnline), 10);
    assert_eq!(count_kind(&seen, MessageKind::UserOffline), 10);
    assert_eq!(hub.connected_users().await, vec![1]);

    let stats = hub.connection_stats().await;
    assert_eq!(stats.total_connections(), 1);
    assert_eq!(stats.topic_subscribers("chat_load"), 1);
}
