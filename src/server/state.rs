use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::channel::{ChannelRegistry, DeliveryChannel, InAppChannel};
use crate::config::Settings;
use crate::hub::Hub;
use crate::session::InboundForwarder;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub hub: Arc<Hub>,
    /// Notification channels behind `/api/v1/notify`; in-app is always present
    pub channels: ChannelRegistry,
    /// Receives inbound kinds the hub does not route itself
    pub forwarder: Option<Arc<dyn InboundForwarder>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, hub: Arc<Hub>) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));

        let channels = ChannelRegistry::new().with_channel(Arc::new(InAppChannel::new(hub.clone())));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            hub,
            channels,
            forwarder: None,
            start_time: Instant::now(),
        }
    }

    /// Add an external channel (email, SMS, push)
    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels = self.channels.with_channel(channel);
        self
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn InboundForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }
}
