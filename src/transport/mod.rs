//! Duplex framed-message transport seam.
//!
//! The session pumps only see [`FrameSink`] and [`FrameStream`]; the
//! WebSocket adapter and the in-memory pair used by tests both plug in here.

pub mod memory;
mod websocket;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::OutboundMessage;

pub use memory::{MemoryPeer, MemoryTransport, PeerEvent};
pub use websocket::WebSocketTransport;

/// One frame read from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write queued messages in order, flushing once at the end
    async fn send_batch(&mut self, batch: &[OutboundMessage]) -> Result<(), TransportError>;

    /// Protocol-level ping sent on each heartbeat tick.
    /// The application-level `heartbeat` envelope is the reply to a client's
    /// own heartbeat and travels through `send_batch`.
    async fn ping(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Next frame; `None` once the peer has gone away
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// An accepted duplex connection that can be split into its two halves
pub trait Transport: Send + 'static {
    type Sink: FrameSink;
    type Stream: FrameStream;

    fn split(self) -> (Self::Sink, Self::Stream);
}
