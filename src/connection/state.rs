use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a connection.
///
/// `Connecting -> Registered -> Active -> Deregistering -> Closed`. Any
/// live state may jump straight to `Deregistering`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Registered = 1,
    Active = 2,
    Deregistering = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Registered,
            2 => Self::Active,
            3 => Self::Deregistering,
            _ => Self::Closed,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Registered | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Deregistering => "deregistering",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit deregistration by the caller
    Requested,
    /// Peer closed the stream or sent a close frame
    PeerClosed,
    /// Read or write on the stream failed
    TransportError,
    /// Peer stayed silent past the connection timeout
    HeartbeatTimeout,
    /// Outbound queue was full
    SlowConsumer,
    /// Found idle by the hub liveness sweep
    Stale,
    /// Hub shutting down
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PeerClosed => "peer_closed",
            Self::TransportError => "transport_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::SlowConsumer => "slow_consumer",
            Self::Stale => "stale",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding a [`ConnectionState`]; transitions are compare-and-swap
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Connecting as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from -> to`, returning false if the cell held something else
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Deregistering` from any earlier state. Only the first caller wins.
    pub(crate) fn begin_close(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >= ConnectionState::Deregistering as u8 {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                ConnectionState::Deregistering as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn set_closed(&self) {
        self.0.store(ConnectionState::Closed as u8, Ordering::Release);
    }
}
