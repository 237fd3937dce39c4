//! Online/offline transitions derived from registry changes.
//!
//! Transitions are computed while the registry write lock is held, so two
//! racing connect/disconnect events for one user always observe each other.

use crate::connection::UserId;
use crate::message::Envelope;

use super::topic::GLOBAL_TOPIC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online(UserId),
    Offline(UserId),
}

impl Presence {
    /// Transition caused by registering a connection
    pub(crate) fn on_register(user_id: UserId, first_for_user: bool) -> Option<Self> {
        first_for_user.then_some(Self::Online(user_id))
    }

    /// Transition caused by deregistering a connection
    pub(crate) fn on_deregister(user_id: UserId, last_for_user: bool) -> Option<Self> {
        last_for_user.then_some(Self::Offline(user_id))
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Self::Online(user_id) | Self::Offline(user_id) => *user_id,
        }
    }

    /// Envelope published to the global topic
    pub fn envelope(&self) -> Envelope {
        let envelope = match self {
            Self::Online(user_id) => Envelope::user_online(*user_id),
            Self::Offline(user_id) => Envelope::user_offline(*user_id),
        };
        envelope.with_topic(GLOBAL_TOPIC).with_id()
    }
}
