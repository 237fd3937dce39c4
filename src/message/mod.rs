//! Wire envelopes exchanged with clients.
//!
//! Inbound frames are decoded into [`Envelope`] exactly once at the connection
//! boundary; outbound envelopes are serialized once into an
//! [`OutboundMessage`] and shared across all recipients.

mod envelope;
mod outbound;

pub use envelope::{
    ChatPayload, Envelope, ErrorPayload, MessageKind, NotificationPayload, OrderUpdatePayload,
    Payload, PresencePayload, ProductViewPayload, SuccessPayload, TopicPayload, TypingPayload,
};
pub use outbound::OutboundMessage;
