use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::UserId;

/// Kind tag carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    Notification,
    OrderUpdate,
    ProductView,
    UserOnline,
    UserOffline,
    Typing,
    Heartbeat,
    Subscribe,
    Unsubscribe,
    Error,
    Success,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Notification => "notification",
            Self::OrderUpdate => "order_update",
            Self::ProductView => "product_view",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::Typing => "typing",
            Self::Heartbeat => "heartbeat",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<UserId>,
    pub content: String,
    #[serde(default = "default_chat_message_type")]
    pub message_type: String,
}

fn default_chat_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatePayload {
    pub order_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductViewPayload {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    pub session_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPayload {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Kind-specific body of an envelope, decoded once at the connection boundary.
///
/// Wire form is `{"type": "<kind>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Chat(ChatPayload),
    Notification(NotificationPayload),
    OrderUpdate(OrderUpdatePayload),
    ProductView(ProductViewPayload),
    UserOnline(PresencePayload),
    UserOffline(PresencePayload),
    Typing(TypingPayload),
    Heartbeat,
    Subscribe(TopicPayload),
    Unsubscribe(TopicPayload),
    Error(ErrorPayload),
    Success(SuccessPayload),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Chat(_) => MessageKind::Chat,
            Self::Notification(_) => MessageKind::Notification,
            Self::OrderUpdate(_) => MessageKind::OrderUpdate,
            Self::ProductView(_) => MessageKind::ProductView,
            Self::UserOnline(_) => MessageKind::UserOnline,
            Self::UserOffline(_) => MessageKind::UserOffline,
            Self::Typing(_) => MessageKind::Typing,
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::Subscribe(_) => MessageKind::Subscribe,
            Self::Unsubscribe(_) => MessageKind::Unsubscribe,
            Self::Error(_) => MessageKind::Error,
            Self::Success(_) => MessageKind::Success,
        }
    }
}

/// Unit of data exchanged over a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Envelope {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            topic: None,
            from_user_id: None,
            timestamp: Utc::now(),
            message_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn from_user(mut self, user_id: UserId) -> Self {
        self.from_user_id = Some(user_id);
        self
    }

    pub fn with_id(mut self) -> Self {
        self.message_id = Some(Uuid::new_v4());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn heartbeat() -> Self {
        Self::new(Payload::Heartbeat)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Payload::Error(ErrorPayload {
            code: code.into(),
            message: message.into(),
        }))
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Payload::Success(SuccessPayload {
            message: message.into(),
            connection_id: None,
            topic: None,
        }))
    }

    pub fn connected(connection_id: Uuid) -> Self {
        Self::new(Payload::Success(SuccessPayload {
            message: "connected".to_string(),
            connection_id: Some(connection_id),
            topic: None,
        }))
    }

    pub fn user_online(user_id: UserId) -> Self {
        Self::new(Payload::UserOnline(PresencePayload { user_id }))
    }

    pub fn user_offline(user_id: UserId) -> Self {
        Self::new(Payload::UserOffline(PresencePayload { user_id }))
    }

    pub fn notification(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Payload::Notification(NotificationPayload {
            title: title.into(),
            body: body.into(),
            category: None,
            data: serde_json::Value::Null,
        }))
        .with_id()
    }
}
