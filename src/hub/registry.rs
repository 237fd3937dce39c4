//! Connection, user and topic indexes.
//!
//! Plain maps, never shared outside the hub: every access goes through the
//! hub's single `RwLock`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId, EnqueueOutcome, UserId};
use crate::error::HubError;
use crate::message::OutboundMessage;

use super::delivery::DeliveryReport;
use super::stats::RegistrySnapshot;

struct Entry {
    connection: Arc<Connection>,
    topics: HashSet<String>,
}

/// Outcome of removing a connection
pub(crate) struct Removed {
    pub connection: Arc<Connection>,
    /// The user has no connections left
    pub last_for_user: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    /// connection_id -> Connection (owning)
    connections: HashMap<ConnectionId, Entry>,
    /// user_id -> Set<connection_id> (supports multiple devices)
    users: HashMap<UserId, HashSet<ConnectionId>>,
    /// topic -> Set<connection_id>
    topics: HashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    /// Insert a connection. Returns true if it is the user's first.
    pub(crate) fn insert(&mut self, connection: Arc<Connection>) -> bool {
        let conn_id = connection.id;
        let user_id = connection.user_id;

        self.connections.insert(
            conn_id,
            Entry {
                connection,
                topics: HashSet::new(),
            },
        );

        let user_conns = self.users.entry(user_id).or_default();
        user_conns.insert(conn_id);
        user_conns.len() == 1
    }

    /// Remove a connection from every index. `None` if already gone.
    pub(crate) fn remove(&mut self, connection_id: ConnectionId) -> Option<Removed> {
        let entry = self.connections.remove(&connection_id)?;
        let user_id = entry.connection.user_id;

        let mut last_for_user = false;
        if let Some(user_conns) = self.users.get_mut(&user_id) {
            user_conns.remove(&connection_id);
            if user_conns.is_empty() {
                self.users.remove(&user_id);
                last_for_user = true;
            }
        }

        for topic in &entry.topics {
            if let Some(members) = self.topics.get_mut(topic) {
                members.remove(&connection_id);
                if members.is_empty() {
                    self.topics.remove(topic);
                }
            }
        }

        Some(Removed {
            connection: entry.connection,
            last_for_user,
        })
    }

    /// Add a topic membership. Returns true if the membership is new.
    pub(crate) fn subscribe(
        &mut self,
        connection_id: ConnectionId,
        topic: &str,
        limit: Option<usize>,
    ) -> Result<bool, HubError> {
        let entry = self
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection(connection_id))?;

        if entry.topics.contains(topic) {
            return Ok(false);
        }
        if let Some(limit) = limit {
            if entry.topics.len() >= limit {
                return Err(HubError::SubscriptionLimit { limit });
            }
        }

        entry.topics.insert(topic.to_string());
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(connection_id);
        Ok(true)
    }

    /// Drop a topic membership. Returns true if it existed.
    pub(crate) fn unsubscribe(
        &mut self,
        connection_id: ConnectionId,
        topic: &str,
    ) -> Result<bool, HubError> {
        let entry = self
            .connections
            .get_mut(&connection_id)
            .ok_or(HubError::UnknownConnection(connection_id))?;

        if !entry.topics.remove(topic) {
            return Ok(false);
        }

        if let Some(members) = self.topics.get_mut(topic) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
        Ok(true)
    }

    pub(crate) fn get(&self, connection_id: ConnectionId) -> Option<&Arc<Connection>> {
        self.connections.get(&connection_id).map(|e| &e.connection)
    }

    pub(crate) fn connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.connections.values().map(|e| &e.connection)
    }

    pub(crate) fn connection_topics(&self, connection_id: ConnectionId) -> Option<Vec<String>> {
        self.connections.get(&connection_id).map(|e| {
            let mut topics: Vec<String> = e.topics.iter().cloned().collect();
            topics.sort();
            topics
        })
    }

    pub(crate) fn user_connection_ids(&self, user_id: UserId) -> Option<&HashSet<ConnectionId>> {
        self.users.get(&user_id)
    }

    pub(crate) fn topic_members(&self, topic: &str) -> Option<&HashSet<ConnectionId>> {
        self.topics.get(topic)
    }

    pub(crate) fn has_user(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub(crate) fn users(&self) -> impl Iterator<Item = &UserId> {
        self.users.keys()
    }

    pub(crate) fn sizes(&self) -> (usize, usize, usize) {
        (self.connections.len(), self.users.len(), self.topics.len())
    }

    /// Non-blocking enqueue of one shared message to each listed connection.
    ///
    /// Ids no longer present are skipped. Connections whose queue is full are
    /// reported in `dropped`; the caller removes them once the lock is released
    /// or, when it already holds the write lock, continues with them itself.
    pub(crate) fn fan_out<'a, I>(&self, ids: I, message: &OutboundMessage) -> DeliveryReport
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let mut report = DeliveryReport::default();
        for id in ids {
            let Some(entry) = self.connections.get(id) else {
                continue;
            };
            match entry.connection.try_enqueue(message) {
                EnqueueOutcome::Queued => report.delivered += 1,
                EnqueueOutcome::Full => report.dropped.push(*id),
                EnqueueOutcome::Closed => report.closed += 1,
            }
        }
        report
    }

    pub(crate) fn fan_out_topic(&self, topic: &str, message: &OutboundMessage) -> DeliveryReport {
        match self.topics.get(topic) {
            Some(members) => self.fan_out(members, message),
            None => DeliveryReport::default(),
        }
    }

    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        let active_connections = self
            .connections
            .values()
            .filter(|e| e.connection.state() == crate::connection::ConnectionState::Active)
            .count();

        RegistrySnapshot {
            total_connections: self.connections.len(),
            active_connections,
            unique_users: self.users.len(),
            connections_per_user: self
                .users
                .iter()
                .map(|(user, conns)| (*user, conns.len()))
                .collect(),
            topics: self
                .topics
                .iter()
                .map(|(topic, members)| (topic.clone(), members.len()))
                .collect(),
        }
    }
}
