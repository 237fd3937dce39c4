//! Graceful shutdown of the hub.
//!
//! The sequence:
//! 1. Tell every connected client the server is going away
//! 2. Stop the coordinator (broadcast intake and liveness sweep)
//! 3. Give clients a bounded window to disconnect on their own
//! 4. Deregister whatever is left

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::hub::Hub;
use crate::message::Envelope;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to disconnect (default: 10 seconds)
    pub drain_timeout: Duration,
    /// How often the remaining connection count is checked while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Handles graceful shutdown of the hub
pub struct GracefulShutdown {
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(hub: Arc<Hub>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(hub, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        hub: Arc<Hub>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            hub,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Stopping hub coordinator");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for connections to close");
        result.connections_closed = self.wait_for_connections_to_close().await;

        result.connections_forced = self.hub.close_all().await;
        if result.connections_forced > 0 {
            tracing::warn!(
                remaining_connections = result.connections_forced,
                "Some connections did not close gracefully"
            );
        }

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            connections_forced = result.connections_forced,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Enqueue a shutdown notice on every connection without waiting
    async fn notify_clients(&self, reason: &str) -> usize {
        let connections = self.hub.connections().await;
        if connections.is_empty() {
            return 0;
        }

        let notice = Envelope::error("SHUTDOWN", reason);
        let mut notified = 0;
        for conn in &connections {
            match self.hub.send_to_connection(conn, &notice).await {
                Ok(()) => notified += 1,
                Err(e) => tracing::debug!(
                    connection_id = %conn.id,
                    error = %e,
                    "Failed to send shutdown notification"
                ),
            }
        }

        tracing::info!(notified, total = connections.len(), "Shutdown notifications sent");
        notified
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.hub.connection_stats().await.total_connections();
        if initial == 0 {
            return 0;
        }

        let wait_future = async {
            loop {
                tokio::time::sleep(self.config.poll_interval).await;
                if self.hub.connection_stats().await.total_connections() == 0 {
                    break;
                }
            }
        };
        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.hub.connection_stats().await.total_connections();
        initial.saturating_sub(remaining)
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Number of clients that were sent a shutdown notice
    pub clients_notified: usize,
    /// Connections that went away on their own during the drain window
    pub connections_closed: usize,
    /// Connections deregistered after the drain window expired
    pub connections_forced: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::connection::Connection;
    use crate::message::MessageKind;

    fn fast_config() -> ShutdownConfig {
        ShutdownConfig {
            drain_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let (hub, _coordinator) = Hub::new(HubConfig::default());
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::with_config(hub, tx, fast_config());

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
        assert_eq!(result.connections_forced, 0);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_then_closes() {
        let (hub, _coordinator) = Hub::new(HubConfig::default());
        let (tx, mut coordinator_rx) = broadcast::channel(1);
        let (conn, mut rx) = Connection::new(3, 16);
        hub.register(conn.clone()).await;
        while rx.try_recv().is_ok() {}

        let shutdown = GracefulShutdown::with_config(hub.clone(), tx, fast_config());
        let result = shutdown.execute("maintenance").await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_forced, 1);
        assert!(conn.is_closed());
        assert!(coordinator_rx.try_recv().is_ok());

        let notice = rx.try_recv().unwrap().decode().unwrap();
        assert_eq!(notice.kind(), MessageKind::Error);
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }
}
