//! Notification delivery channels.
//!
//! Each channel is one way of reaching a user. Only the in-app channel lives
//! here; email, SMS and push providers plug in through [`DeliveryChannel`]
//! and `AppState::with_channel`. The registry backs `POST /api/v1/notify`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::UserId;
use crate::error::HubError;
use crate::hub::{DeliveryReport, Hub};
use crate::message::{Envelope, NotificationPayload, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    InApp,
    Email,
    Sms,
    Push,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        };
        f.write_str(name)
    }
}

/// A notification addressed to one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Notification {
    pub fn envelope(&self) -> Envelope {
        Envelope::new(Payload::Notification(NotificationPayload {
            title: self.title.clone(),
            body: self.body.clone(),
            category: self.category.clone(),
            data: self.data.clone(),
        }))
        .with_id()
    }
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("No channel registered for {0}")]
    Unavailable(ChannelKind),
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, notification: &Notification) -> Result<DeliveryReport, ChannelError>;
}

/// Delivers through the hub to every live connection of the user
pub struct InAppChannel {
    hub: Arc<Hub>,
}

impl InAppChannel {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl DeliveryChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn deliver(&self, notification: &Notification) -> Result<DeliveryReport, ChannelError> {
        let report = self
            .hub
            .send_to_user(notification.user_id, notification.envelope())
            .await?;
        Ok(report)
    }
}

/// Channels available to the service, by kind
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    channels: HashMap<ChannelKind, Arc<dyn DeliveryChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.channels.keys().copied().collect()
    }

    /// Deliver on each requested channel; each result is independent
    pub async fn deliver(
        &self,
        notification: &Notification,
        kinds: &[ChannelKind],
    ) -> Vec<(ChannelKind, Result<DeliveryReport, ChannelError>)> {
        let mut results = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let result = match self.channels.get(kind) {
                Some(channel) => channel.deliver(notification).await,
                None => Err(ChannelError::Unavailable(*kind)),
            };
            if let Err(e) = &result {
                tracing::debug!(channel = %kind, user_id = notification.user_id, error = %e, "Channel delivery failed");
            }
            results.push((*kind, result));
        }
        results
    }
}
