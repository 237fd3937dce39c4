use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::message::OutboundMessage;

use super::Hub;

/// Background task that owns the broadcast intake and the liveness sweep
pub struct HubCoordinator {
    hub: Arc<Hub>,
    broadcasts: mpsc::Receiver<OutboundMessage>,
}

impl HubCoordinator {
    pub(crate) fn new(hub: Arc<Hub>, broadcasts: mpsc::Receiver<OutboundMessage>) -> Self {
        Self { hub, broadcasts }
    }

    /// Drain broadcasts in intake order and sweep idle connections until shutdown
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let sweep_interval = self.hub.config().sweep_interval();
        let mut sweep_timer = tokio::time::interval(sweep_interval);

        // Skip immediate first tick
        sweep_timer.tick().await;

        tracing::info!(
            sweep_interval_ms = sweep_interval.as_millis() as u64,
            connection_timeout_ms = self.hub.config().connection_timeout_ms,
            "Hub coordinator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Hub coordinator received shutdown signal");
                    break;
                }
                message = self.broadcasts.recv() => {
                    match message {
                        Some(message) => {
                            let report = self.hub.publish_broadcast(&message).await;
                            tracing::debug!(
                                delivered = report.delivered,
                                dropped = report.dropped.len(),
                                "Broadcast published"
                            );
                        }
                        None => break,
                    }
                }
                _ = sweep_timer.tick() => {
                    let removed = self.hub.sweep_stale().await;
                    if removed > 0 {
                        tracing::info!(removed, "Stale connection sweep completed");
                    }
                }
            }
        }

        // Reject further broadcasts, then flush what was already accepted
        self.broadcasts.close();
        while let Ok(message) = self.broadcasts.try_recv() {
            self.hub.publish_broadcast(&message).await;
        }

        tracing::info!("Hub coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::HubConfig;
    use crate::connection::Connection;
    use crate::message::{Envelope, MessageKind};

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        let (hub, coordinator) = Hub::new(HubConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(coordinator.run(shutdown_rx));

        let (c1, mut r1) = Connection::new(1, 16);
        let (c2, mut r2) = Connection::new(2, 16);
        hub.register(c1).await;
        hub.register(c2).await;
        while r1.try_recv().is_ok() {}
        while r2.try_recv().is_ok() {}

        hub.broadcast_all(Envelope::notification("maintenance", "soon"))
            .unwrap();

        for rx in [&mut r1, &mut r2] {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let env = msg.decode().unwrap();
            assert_eq!(env.kind(), MessageKind::Notification);
            assert_eq!(env.topic.as_deref(), Some("global"));
        }

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_connections() {
        let config = HubConfig {
            heartbeat_interval_ms: 10,
            connection_timeout_ms: 30,
            sweep_interval_ms: 20,
            ..Default::default()
        };
        let (hub, coordinator) = Hub::new(config);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(coordinator.run(shutdown_rx));

        let (conn, _rx) = Connection::new(1, 16);
        hub.register(conn.clone()).await;

        tokio::time::timeout(Duration::from_secs(2), conn.closed())
            .await
            .unwrap();
        assert!(!hub.is_user_online(1).await);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_rejected_after_shutdown() {
        let (hub, coordinator) = Hub::new(HubConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(coordinator.run(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();

        assert!(matches!(
            hub.broadcast_all(Envelope::heartbeat()),
            Err(crate::error::HubError::HubClosed)
        ));
    }
}
