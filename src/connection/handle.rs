//! Connection handle and related types

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::message::OutboundMessage;

use super::state::{ConnectionState, StateCell};

/// Authenticated numeric user identity supplied by the caller
pub type UserId = u64;

/// Opaque unique connection identity
pub type ConnectionId = Uuid;

/// Result of a non-blocking enqueue onto a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue is at capacity; the consumer is lagging
    Full,
    /// Queue or connection already closed
    Closed,
}

/// Handle for a single client connection.
///
/// The hub registry owns the handle; the connection's pumps hold clones of
/// the `Arc`. The outbound queue's receiving half is returned separately by
/// [`Connection::new`] and is owned by the outbound pump.
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    metadata: HashMap<String, String>,
    sender: mpsc::Sender<OutboundMessage>,
    capacity: usize,
    /// Last peer activity (Unix millis), lock-free
    last_activity: AtomicI64,
    state: StateCell,
    closed: watch::Sender<bool>,
}

impl Connection {
    pub fn new(
        user_id: UserId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        Self::with_metadata(user_id, capacity, HashMap::new())
    }

    pub fn with_metadata(
        user_id: UserId,
        capacity: usize,
        metadata: HashMap<String, String>,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);
        let now = Utc::now();

        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id,
            connected_at: now,
            metadata,
            sender,
            capacity,
            last_activity: AtomicI64::new(now.timestamp_millis()),
            state: StateCell::new(),
            closed,
        });

        (connection, receiver)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        !matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Registered | ConnectionState::Active
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Number of messages currently waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    /// Time since the peer was last heard from
    pub fn idle_for(&self) -> Duration {
        let idle_ms = Utc::now().timestamp_millis() - self.last_activity.load(Ordering::Relaxed);
        Duration::from_millis(idle_ms.max(0) as u64)
    }

    /// Attempt to place a message on the outbound queue without waiting
    pub fn try_enqueue(&self, message: &OutboundMessage) -> EnqueueOutcome {
        if self.is_closed() {
            return EnqueueOutcome::Closed;
        }
        match self.sender.try_send(message.clone()) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Wait until the connection has been closed by deregistration
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub(crate) fn mark_registered(&self) -> bool {
        self.state
            .transition(ConnectionState::Connecting, ConnectionState::Registered)
    }

    /// First observed traffic promotes a registered connection to active
    pub(crate) fn mark_active(&self) {
        self.state
            .transition(ConnectionState::Registered, ConnectionState::Active);
    }

    pub(crate) fn begin_close(&self) -> bool {
        self.state.begin_close()
    }

    /// Terminal transition; wakes both pumps
    pub(crate) fn finish_close(&self) {
        self.state.set_closed();
        self.closed.send_replace(true);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}
