use std::sync::Arc;

use super::Envelope;

/// An envelope serialized once and shared by every recipient of a fan-out.
///
/// Cloning only bumps a reference count; the bytes are never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    text: Arc<str>,
}

impl OutboundMessage {
    pub fn encode(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(envelope)?;
        Ok(Self {
            text: Arc::from(json),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Decode the shared bytes back into an envelope (used by tests and tooling)
    pub fn decode(&self) -> Result<Envelope, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    pub(crate) fn shares_bytes_with(&self, other: &OutboundMessage) -> bool {
        Arc::ptr_eq(&self.text, &other.text)
    }
}

impl TryFrom<&Envelope> for OutboundMessage {
    type Error = serde_json::Error;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        Self::encode(envelope)
    }
}
