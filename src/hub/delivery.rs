use serde::Serialize;
use smallvec::SmallVec;

use crate::connection::ConnectionId;

/// Result of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections the message was enqueued on
    pub delivered: usize,
    /// Connections dropped because their outbound queue was full
    pub dropped: SmallVec<[ConnectionId; 4]>,
    /// Targets already closing when the send was attempted
    pub closed: usize,
}

impl DeliveryReport {
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.dropped.is_empty() && self.closed == 0
    }

    pub(crate) fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.dropped.extend(other.dropped);
        self.closed += other.closed;
    }
}
