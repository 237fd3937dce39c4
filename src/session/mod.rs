//! Per-connection session: the inbound and outbound pumps around one
//! transport, tied to the hub's registration lifecycle.
//!
//! A session registers its connection before any frame is read and
//! deregisters it when either pump stops. Deregistration from elsewhere
//! (slow consumer, sweep, shutdown) wakes both pumps through
//! [`Connection::closed`].

mod inbound;
mod outbound;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::MIN_OUTBOUND_QUEUE_CAPACITY;
use crate::connection::{CloseReason, Connection, UserId};
use crate::hub::Hub;
use crate::message::Envelope;
use crate::transport::Transport;

/// Receives inbound envelopes the hub does not route itself
/// (notifications, order updates, product views and so on).
///
/// Envelopes arrive already stamped with the sender's identity.
#[async_trait]
pub trait InboundForwarder: Send + Sync + 'static {
    async fn forward(&self, from: &Connection, envelope: Envelope);
}

/// Builder for one connection's session
pub struct Session {
    hub: Arc<Hub>,
    forwarder: Option<Arc<dyn InboundForwarder>>,
    metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            forwarder: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn InboundForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Register a connection for `user_id` and start its pumps.
    ///
    /// The connection is in the registry when this returns.
    pub async fn start<T: Transport>(self, user_id: UserId, transport: T) -> SessionHandle {
        let capacity = self
            .hub
            .config()
            .outbound_queue_capacity
            .max(MIN_OUTBOUND_QUEUE_CAPACITY);
        let (connection, outbound_rx) = Connection::with_metadata(user_id, capacity, self.metadata);

        self.hub.register(connection.clone()).await;

        let (sink, stream) = transport.split();
        let hub = self.hub;
        let conn = connection.clone();

        let task = tokio::spawn(async move {
            let mut send_task = tokio::spawn(outbound::run(
                conn.clone(),
                outbound_rx,
                sink,
                hub.config().clone(),
            ));
            let mut recv_task = tokio::spawn(inbound::run(
                hub.clone(),
                conn.clone(),
                stream,
                self.forwarder,
            ));

            // Wait for either pump to stop, then for the other one
            let (finished, result) = tokio::select! {
                result = &mut send_task => (Pump::Outbound, result),
                result = &mut recv_task => (Pump::Inbound, result),
            };
            tracing::debug!(connection_id = %conn.id, pump = ?finished, "Connection pump completed");
            let remaining = match finished {
                Pump::Outbound => recv_task,
                Pump::Inbound => send_task,
            };
            let reason = result.unwrap_or_else(|e| {
                tracing::error!(connection_id = %conn.id, error = %e, "Connection pump panicked");
                Some(CloseReason::TransportError)
            });

            if let Some(reason) = reason {
                hub.deregister_with(conn.id, reason).await;
            }

            // Deregistration fires the close signal the remaining pump waits on
            if let Err(e) = remaining.await {
                tracing::error!(connection_id = %conn.id, error = %e, "Connection pump panicked");
            }

            tracing::info!(
                connection_id = %conn.id,
                user_id = conn.user_id,
                duration_secs = (chrono::Utc::now() - conn.connected_at).num_seconds(),
                "Connection session ended"
            );
            reason
        });

        SessionHandle { connection, task }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pump {
    Outbound,
    Inbound,
}

/// Running session
pub struct SessionHandle {
    pub connection: Arc<Connection>,
    task: JoinHandle<Option<CloseReason>>,
}

impl SessionHandle {
    /// Wait for the session to end.
    ///
    /// Returns the reason when the session itself ended the connection, or
    /// `None` when the hub closed it (slow consumer, sweep, shutdown).
    pub async fn wait(self) -> Option<CloseReason> {
        self.task.await.unwrap_or(Some(CloseReason::TransportError))
    }
}

/// Serve one already-authenticated connection until it closes
pub async fn serve_connection<T: Transport>(
    hub: Arc<Hub>,
    user_id: UserId,
    transport: T,
) -> Option<CloseReason> {
    Session::new(hub).start(user_id, transport).await.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::HubConfig;
    use crate::connection::ConnectionState;
    use crate::transport::{MemoryPeer, MemoryTransport, PeerEvent};

    const WAIT: Duration = Duration::from_secs(2);

    async fn start(config: HubConfig, user_id: UserId) -> (Arc<Hub>, SessionHandle, MemoryPeer) {
        let (hub, _coordinator) = Hub::new(config);
        let (transport, peer) = MemoryTransport::pair();
        let handle = Session::new(hub.clone()).start(user_id, transport).await;
        (hub, handle, peer)
    }

    /// Wait for the session and check the connection is gone everywhere
    async fn finish(hub: &Hub, handle: SessionHandle) -> Option<CloseReason> {
        let conn = handle.connection.clone();
        let reason = tokio::time::timeout(WAIT, handle.wait())
            .await
            .expect("session did not end");
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(hub.connection(conn.id).await.is_none());
        reason
    }

    #[tokio::test]
    async fn test_ends_with_peer_closed() {
        let (hub, handle, mut peer) = start(HubConfig::default(), 1).await;
        peer.hang_up();
        assert_eq!(finish(&hub, handle).await, Some(CloseReason::PeerClosed));
    }

    #[tokio::test]
    async fn test_ends_with_heartbeat_timeout() {
        let config = HubConfig {
            heartbeat_interval_ms: 10,
            connection_timeout_ms: 30,
            ..Default::default()
        };
        let (hub, handle, _peer) = start(config, 1).await;
        assert_eq!(
            finish(&hub, handle).await,
            Some(CloseReason::HeartbeatTimeout)
        );
    }

    #[tokio::test]
    async fn test_ends_without_reason_when_hub_closes() {
        let (hub, handle, mut peer) = start(HubConfig::default(), 1).await;
        assert!(hub.deregister(handle.connection.id).await);
        assert_eq!(finish(&hub, handle).await, None);

        // The outbound pump closed the sink on its way out
        let mut saw_close = false;
        while let Ok(Some(event)) = tokio::time::timeout(WAIT, peer.recv()).await {
            if event == PeerEvent::Closed {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close);
    }

    #[tokio::test]
    async fn test_serve_connection_returns_reason() {
        let (hub, _coordinator) = Hub::new(HubConfig::default());
        let (transport, mut peer) = MemoryTransport::pair();
        peer.hang_up();
        let reason = tokio::time::timeout(WAIT, serve_connection(hub.clone(), 9, transport))
            .await
            .unwrap();
        assert_eq!(reason, Some(CloseReason::PeerClosed));
        assert!(!hub.is_user_online(9).await);
    }
}
