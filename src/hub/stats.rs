//! Hub statistics

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::connection::UserId;

/// Registry view captured under the read lock
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub total_connections: usize,
    /// Connections that have exchanged at least one frame
    pub active_connections: usize,
    pub unique_users: usize,
    pub connections_per_user: HashMap<UserId, usize>,
    pub topics: HashMap<String, usize>,
}

/// Running delivery counters
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub user_sends: AtomicU64,
    pub topic_sends: AtomicU64,
    pub broadcasts: AtomicU64,
    pub enqueued: AtomicU64,
    pub slow_consumer_drops: AtomicU64,
    pub broadcast_rejected: AtomicU64,
}

impl DeliveryCounters {
    pub(crate) fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            user_sends: self.user_sends.load(Ordering::Relaxed),
            topic_sends: self.topic_sends.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            slow_consumer_drops: self.slow_consumer_drops.load(Ordering::Relaxed),
            broadcast_rejected: self.broadcast_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of delivery counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryStats {
    pub user_sends: u64,
    pub topic_sends: u64,
    pub broadcasts: u64,
    pub enqueued: u64,
    pub slow_consumer_drops: u64,
    pub broadcast_rejected: u64,
}

/// Connection statistics exposed to the rest of the system
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    #[serde(flatten)]
    pub registry: RegistrySnapshot,
    pub delivery: DeliveryStats,
}

impl ConnectionStats {
    pub fn total_connections(&self) -> usize {
        self.registry.total_connections
    }

    pub fn topic_subscribers(&self, topic: &str) -> usize {
        self.registry.topics.get(topic).copied().unwrap_or(0)
    }

    pub fn user_connections(&self, user_id: UserId) -> usize {
        self.registry
            .connections_per_user
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_snapshot() {
        let counters = DeliveryCounters::default();
        counters.topic_sends.fetch_add(3, Ordering::Relaxed);
        counters.enqueued.fetch_add(10, Ordering::Relaxed);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.topic_sends, 3);
        assert_eq!(snapshot.enqueued, 10);
        assert_eq!(snapshot.broadcasts, 0);
    }
}
