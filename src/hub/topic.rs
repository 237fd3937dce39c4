//! Topic naming.
//!
//! Topics need not be declared; a topic exists while it has subscribers.

use crate::connection::UserId;

/// Topic every connection joins at registration
pub const GLOBAL_TOPIC: &str = "global";

const USER_PREFIX: &str = "user_";
const CHAT_PREFIX: &str = "chat_";
const ORDER_PREFIX: &str = "order_";

const MAX_TOPIC_LEN: usize = 64;

/// Personal inbox topic of a user
pub fn user_topic(user_id: UserId) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

/// Topic of a chat session
pub fn chat_topic(session_id: &str) -> String {
    format!("{}{}", CHAT_PREFIX, session_id)
}

/// Topic carrying updates for one order
pub fn order_topic(order_id: &str) -> String {
    format!("{}{}", ORDER_PREFIX, order_id)
}

/// Validate topic name
pub fn is_valid_topic_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_TOPIC_LEN {
        return false;
    }

    // Only allow alphanumeric, dash, underscore, dot and colon
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Owner of a personal topic, if `name` is one
pub fn personal_topic_owner(name: &str) -> Option<UserId> {
    name.strip_prefix(USER_PREFIX)?.parse().ok()
}

/// Whether `user_id` may join `topic` on its own request
pub(crate) fn may_subscribe(user_id: UserId, topic: &str) -> bool {
    match personal_topic_owner(topic) {
        Some(owner) => owner == user_id,
        None => true,
    }
}

/// Topics the hub maintains for a connection from registration to deregistration
pub(crate) fn is_implicit_for(user_id: UserId, topic: &str) -> bool {
    topic == GLOBAL_TOPIC || personal_topic_owner(topic) == Some(user_id)
}
