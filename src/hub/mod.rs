//! The hub: single coordinator over all live connections.
//!
//! This module provides:
//! - Registration and idempotent deregistration
//! - Topic subscription management
//! - Best-effort, non-blocking delivery to a user, a topic, or everyone
//! - Presence announcements derived from registry changes
//! - The coordinator task draining broadcasts and sweeping idle connections
//!
//! All registry state lives behind one `RwLock`. Fan-out takes the read lock;
//! anything that changes membership takes the write lock. Only non-blocking
//! enqueues happen under the lock, never stream I/O.

mod coordinator;
mod delivery;
mod presence;
mod registry;
mod stats;
pub mod topic;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use crate::config::HubConfig;
use crate::connection::{CloseReason, Connection, ConnectionId, EnqueueOutcome, UserId};
use crate::error::HubError;
use crate::message::{Envelope, OutboundMessage};
use crate::metrics::{ConnectionMetrics, LivenessMetrics, MessageMetrics};

pub use coordinator::HubCoordinator;
pub use delivery::DeliveryReport;
pub use presence::Presence;
pub use stats::{ConnectionStats, DeliveryStats, RegistrySnapshot};
pub use topic::{chat_topic, order_topic, user_topic, GLOBAL_TOPIC};

use registry::Registry;
use stats::DeliveryCounters;

pub struct Hub {
    config: HubConfig,
    registry: RwLock<Registry>,
    broadcast_tx: mpsc::Sender<OutboundMessage>,
    counters: DeliveryCounters,
}

impl Hub {
    /// Create a hub and the coordinator that must be run alongside it
    pub fn new(config: HubConfig) -> (Arc<Self>, HubCoordinator) {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_capacity.max(1));
        let hub = Arc::new(Self {
            config,
            registry: RwLock::new(Registry::default()),
            broadcast_tx,
            counters: DeliveryCounters::default(),
        });
        let coordinator = HubCoordinator::new(hub.clone(), broadcast_rx);
        (hub, coordinator)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Add a new connection and join it to its personal and global topics.
    ///
    /// Publishes `user_online` when this is the user's first connection.
    /// Connections that are not freshly created are ignored.
    #[tracing::instrument(
        name = "hub.register",
        skip(self, connection),
        fields(connection_id = %connection.id, user_id = connection.user_id)
    )]
    pub async fn register(&self, connection: Arc<Connection>) {
        if !connection.mark_registered() {
            tracing::warn!(
                state = %connection.state(),
                "Ignoring registration of a connection that is not new"
            );
            return;
        }

        let conn_id = connection.id;
        let user_id = connection.user_id;

        let (dropped, sizes, first) = {
            let mut registry = self.registry.write().await;
            let first = registry.insert(connection);
            for topic in [user_topic(user_id), GLOBAL_TOPIC.to_string()] {
                // Uncapped and just inserted, so this only fails on a registry bug
                if let Err(e) = registry.subscribe(conn_id, &topic, None) {
                    tracing::error!(topic = %topic, error = %e, "Failed to join implicit topic");
                }
            }

            let mut report = DeliveryReport::default();
            if let Some(welcome) = encode_or_log(&Envelope::connected(conn_id)) {
                report.merge(registry.fan_out(std::iter::once(&conn_id), &welcome));
            }
            if let Some(presence) = Presence::on_register(user_id, first) {
                if let Some(online) = encode_or_log(&presence.envelope()) {
                    report.merge(registry.fan_out_topic(GLOBAL_TOPIC, &online));
                }
            }
            (report.dropped, registry.sizes(), first)
        };

        ConnectionMetrics::record_opened();
        ConnectionMetrics::set_registry_sizes(sizes.0, sizes.1, sizes.2);
        tracing::info!(first_for_user = first, "Connection registered");

        if !dropped.is_empty() {
            self.remove_connections(dropped, CloseReason::SlowConsumer)
                .await;
        }
    }

    /// Remove a connection from every index and close it.
    ///
    /// Idempotent: returns false, and publishes nothing, if the connection is
    /// already gone.
    pub async fn deregister(&self, connection_id: ConnectionId) -> bool {
        self.deregister_with(connection_id, CloseReason::Requested)
            .await
    }

    pub async fn deregister_with(&self, connection_id: ConnectionId, reason: CloseReason) -> bool {
        self.remove_connections([connection_id], reason).await > 0
    }

    /// Remove connections one at a time under the write lock.
    ///
    /// Announcing `user_offline` can itself overflow other queues; those
    /// connections are appended to the work list rather than recursed into.
    async fn remove_connections<I>(&self, ids: I, reason: CloseReason) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let mut pending: Vec<(ConnectionId, CloseReason)> =
            ids.into_iter().map(|id| (id, reason)).collect();
        let mut count = 0;

        while let Some((id, reason)) = pending.pop() {
            let (connection, last_for_user, sizes) = {
                let mut registry = self.registry.write().await;
                let Some(removed) = registry.remove(id) else {
                    continue;
                };
                removed.connection.begin_close();
                removed.connection.finish_close();

                let user_id = removed.connection.user_id;
                if let Some(presence) = Presence::on_deregister(user_id, removed.last_for_user) {
                    if let Some(offline) = encode_or_log(&presence.envelope()) {
                        let report = registry.fan_out_topic(GLOBAL_TOPIC, &offline);
                        pending.extend(
                            report
                                .dropped
                                .into_iter()
                                .map(|id| (id, CloseReason::SlowConsumer)),
                        );
                    }
                }
                (removed.connection, removed.last_for_user, registry.sizes())
            };

            count += 1;
            let lifetime = (Utc::now() - connection.connected_at).num_milliseconds() as f64 / 1000.0;
            ConnectionMetrics::record_closed(reason.as_str(), lifetime);
            ConnectionMetrics::set_registry_sizes(sizes.0, sizes.1, sizes.2);

            match reason {
                CloseReason::SlowConsumer => {
                    self.counters
                        .slow_consumer_drops
                        .fetch_add(1, Ordering::Relaxed);
                    LivenessMetrics::record_slow_consumer();
                    tracing::warn!(
                        connection_id = %id,
                        user_id = connection.user_id,
                        capacity = connection.capacity(),
                        "Dropping slow consumer: outbound queue full"
                    );
                }
                CloseReason::HeartbeatTimeout | CloseReason::Stale => {
                    LivenessMetrics::record_heartbeat_timeout();
                }
                _ => {}
            }

            tracing::info!(
                connection_id = %id,
                user_id = connection.user_id,
                reason = %reason,
                last_for_user = last_for_user,
                "Connection deregistered"
            );
        }

        count
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Join a topic. Returns false if already a member.
    pub async fn subscribe(&self, connection_id: ConnectionId, topic: &str) -> Result<bool, HubError> {
        if !topic::is_valid_topic_name(topic) {
            return Err(HubError::InvalidTopic(topic.to_string()));
        }

        let (changed, topics) = {
            let mut registry = self.registry.write().await;
            let user_id = registry
                .get(connection_id)
                .ok_or(HubError::UnknownConnection(connection_id))?
                .user_id;
            if !topic::may_subscribe(user_id, topic) {
                return Err(HubError::ProtectedTopic(topic.to_string()));
            }
            let changed = registry.subscribe(
                connection_id,
                topic,
                Some(self.config.max_subscriptions_per_connection),
            )?;
            (changed, registry.sizes())
        };

        ConnectionMetrics::set_registry_sizes(topics.0, topics.1, topics.2);
        tracing::debug!(connection_id = %connection_id, topic = %topic, changed, "Subscribed to topic");
        Ok(changed)
    }

    /// Leave a topic. Returns false if not a member.
    ///
    /// The personal and global topics cannot be left while registered.
    pub async fn unsubscribe(&self, connection_id: ConnectionId, topic: &str) -> Result<bool, HubError> {
        let (changed, topics) = {
            let mut registry = self.registry.write().await;
            let user_id = registry
                .get(connection_id)
                .ok_or(HubError::UnknownConnection(connection_id))?
                .user_id;
            if topic::is_implicit_for(user_id, topic) {
                return Err(HubError::ProtectedTopic(topic.to_string()));
            }
            let changed = registry.unsubscribe(connection_id, topic)?;
            (changed, registry.sizes())
        };

        ConnectionMetrics::set_registry_sizes(topics.0, topics.1, topics.2);
        tracing::debug!(connection_id = %connection_id, topic = %topic, changed, "Unsubscribed from topic");
        Ok(changed)
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Deliver to every live connection of one user.
    ///
    /// Fails only when the user has no live connections.
    #[tracing::instrument(
        name = "hub.send_to_user",
        skip(self, envelope),
        fields(kind = %envelope.kind())
    )]
    pub async fn send_to_user(&self, user_id: UserId, mut envelope: Envelope) -> Result<DeliveryReport, HubError> {
        if envelope.topic.is_none() {
            envelope.topic = Some(user_topic(user_id));
        }
        let message = OutboundMessage::encode(&envelope)?;

        let report = {
            let registry = self.registry.read().await;
            let Some(ids) = registry.user_connection_ids(user_id) else {
                return Err(HubError::no_user(user_id));
            };
            registry.fan_out(ids, &message)
        };

        self.counters.user_sends.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_user_sent();
        Ok(self.settle(report).await)
    }

    /// Deliver to every current member of a topic. No members is not an error.
    #[tracing::instrument(
        name = "hub.send_to_topic",
        skip(self, envelope),
        fields(kind = %envelope.kind())
    )]
    pub async fn send_to_topic(&self, topic: &str, mut envelope: Envelope) -> Result<DeliveryReport, HubError> {
        if envelope.topic.is_none() {
            envelope.topic = Some(topic.to_string());
        }
        let message = OutboundMessage::encode(&envelope)?;
        Ok(self.publish(topic, &message).await)
    }

    /// Deliver once to every connection that is a member of any listed topic
    #[tracing::instrument(
        name = "hub.send_to_topics",
        skip(self, envelope, topics),
        fields(kind = %envelope.kind(), topic_count = topics.len())
    )]
    pub async fn send_to_topics(&self, topics: &[String], mut envelope: Envelope) -> Result<DeliveryReport, HubError> {
        if envelope.topic.is_none() {
            envelope.topic = topics.first().cloned();
        }
        let message = OutboundMessage::encode(&envelope)?;

        let report = {
            let registry = self.registry.read().await;
            let mut targets = HashSet::new();
            for topic in topics {
                if let Some(members) = registry.topic_members(topic) {
                    targets.extend(members.iter().copied());
                }
            }
            registry.fan_out(&targets, &message)
        };

        self.counters.topic_sends.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_topic_sent();
        Ok(self.settle(report).await)
    }

    /// Queue a message for every connection via the broadcast intake.
    ///
    /// Never waits: a full intake yields [`HubError::BroadcastSaturated`].
    pub fn broadcast_all(&self, mut envelope: Envelope) -> Result<(), HubError> {
        if envelope.topic.is_none() {
            envelope.topic = Some(GLOBAL_TOPIC.to_string());
        }
        let message = OutboundMessage::encode(&envelope)?;

        match self.broadcast_tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters
                    .broadcast_rejected
                    .fetch_add(1, Ordering::Relaxed);
                MessageMetrics::record_broadcast_saturated();
                tracing::warn!(
                    capacity = self.config.broadcast_queue_capacity,
                    "Broadcast intake saturated, rejecting broadcast"
                );
                Err(HubError::BroadcastSaturated)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HubError::HubClosed),
        }
    }

    /// Enqueue directly on one connection (replies to its own requests)
    pub async fn send_to_connection(&self, connection: &Connection, envelope: &Envelope) -> Result<(), HubError> {
        let message = OutboundMessage::encode(envelope)?;
        match connection.try_enqueue(&message) {
            EnqueueOutcome::Queued => Ok(()),
            EnqueueOutcome::Full => {
                self.remove_connections([connection.id], CloseReason::SlowConsumer)
                    .await;
                Err(HubError::ConnectionClosed(connection.id))
            }
            EnqueueOutcome::Closed => Err(HubError::ConnectionClosed(connection.id)),
        }
    }

    /// Fan out a broadcast drained from the intake
    pub(crate) async fn publish_broadcast(&self, message: &OutboundMessage) -> DeliveryReport {
        let report = {
            let registry = self.registry.read().await;
            registry.fan_out_topic(GLOBAL_TOPIC, message)
        };
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_broadcast_sent();
        self.settle(report).await
    }

    async fn publish(&self, topic: &str, message: &OutboundMessage) -> DeliveryReport {
        let report = {
            let registry = self.registry.read().await;
            registry.fan_out_topic(topic, message)
        };
        self.counters.topic_sends.fetch_add(1, Ordering::Relaxed);
        MessageMetrics::record_topic_sent();
        self.settle(report).await
    }

    /// Record a fan-out and drop the recipients that could not keep up
    async fn settle(&self, report: DeliveryReport) -> DeliveryReport {
        self.counters
            .enqueued
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        MessageMetrics::record_enqueued(report.delivered as u64);

        if !report.dropped.is_empty() {
            MessageMetrics::record_dropped(report.dropped.len() as u64);
            self.remove_connections(report.dropped.iter().copied(), CloseReason::SlowConsumer)
                .await;
        }

        tracing::debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            closed = report.closed,
            "Fan-out complete"
        );
        report
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    /// Deregister every connection idle for longer than the configured timeout
    pub async fn sweep_stale(&self) -> usize {
        let timeout = self.config.connection_timeout();
        let stale: Vec<ConnectionId> = {
            let registry = self.registry.read().await;
            registry
                .connections()
                .filter(|c| c.idle_for() > timeout)
                .map(|c| c.id)
                .collect()
        };

        for conn_id in &stale {
            tracing::info!(connection_id = %conn_id, "Removing stale connection due to timeout");
        }
        self.remove_connections(stale, CloseReason::Stale).await
    }

    /// Deregister every connection
    pub async fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = {
            let registry = self.registry.read().await;
            registry.connections().map(|c| c.id).collect()
        };
        self.remove_connections(ids, CloseReason::Shutdown).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        self.registry.read().await.has_user(user_id)
    }

    /// Users with at least one live connection, ascending
    pub async fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.registry.read().await.users().copied().collect();
        users.sort_unstable();
        users
    }

    pub async fn user_connection_count(&self, user_id: UserId) -> usize {
        self.registry
            .read()
            .await
            .user_connection_ids(user_id)
            .map_or(0, |ids| ids.len())
    }

    pub async fn topic_subscribers(&self, topic: &str) -> usize {
        self.registry
            .read()
            .await
            .topic_members(topic)
            .map_or(0, |ids| ids.len())
    }

    /// Topics a connection belongs to, sorted; `None` if not registered
    pub async fn subscriptions(&self, connection_id: ConnectionId) -> Option<Vec<String>> {
        self.registry.read().await.connection_topics(connection_id)
    }

    pub async fn connection(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        self.registry.read().await.get(connection_id).cloned()
    }

    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.registry.read().await.connections().cloned().collect()
    }

    pub async fn connection_stats(&self) -> ConnectionStats {
        let registry = self.registry.read().await.snapshot();
        ConnectionStats {
            registry,
            delivery: self.counters.snapshot(),
        }
    }
}

fn encode_or_log(envelope: &Envelope) -> Option<OutboundMessage> {
    match OutboundMessage::encode(envelope) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::error!(error = %e, kind = %envelope.kind(), "Failed to encode envelope");
            None
        }
    }
}
