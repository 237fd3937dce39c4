//! In-process transport pair.
//!
//! The sink writes into a bounded channel read by [`MemoryPeer`]; a peer that
//! stops reading stalls the writer exactly like a stuck socket would.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::{Envelope, OutboundMessage};

use super::{Frame, FrameSink, FrameStream, Transport};

const DEFAULT_PEER_BUFFER: usize = 64;

/// What the remote end observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// One flushed write of one or more text frames
    Batch(Vec<String>),
    Ping,
    Closed,
}

pub struct MemoryTransport {
    outgoing: mpsc::Sender<PeerEvent>,
    incoming: mpsc::Receiver<Frame>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryPeer) {
        Self::pair_with_buffer(DEFAULT_PEER_BUFFER)
    }

    /// `buffer` bounds how many writes the peer may leave unread
    pub fn pair_with_buffer(buffer: usize) -> (Self, MemoryPeer) {
        let (out_tx, out_rx) = mpsc::channel(buffer.max(1));
        let (in_tx, in_rx) = mpsc::channel(DEFAULT_PEER_BUFFER);
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
            },
            MemoryPeer {
                frames: Some(in_tx),
                events: out_rx,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn split(self) -> (Self::Sink, Self::Stream) {
        (
            MemorySink {
                outgoing: self.outgoing,
            },
            MemoryStream {
                incoming: self.incoming,
            },
        )
    }
}

pub struct MemorySink {
    outgoing: mpsc::Sender<PeerEvent>,
}

impl MemorySink {
    async fn emit(&self, event: PeerEvent) -> Result<(), TransportError> {
        self.outgoing
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_batch(&mut self, batch: &[OutboundMessage]) -> Result<(), TransportError> {
        let frames = batch.iter().map(|m| m.as_str().to_owned()).collect();
        self.emit(PeerEvent::Batch(frames)).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.emit(PeerEvent::Ping).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Peer may already be gone
        let _ = self.outgoing.try_send(PeerEvent::Closed);
        Ok(())
    }
}

pub struct MemoryStream {
    incoming: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }
}

/// Remote end of a [`MemoryTransport`]
pub struct MemoryPeer {
    frames: Option<mpsc::Sender<Frame>>,
    events: mpsc::Receiver<PeerEvent>,
}

impl MemoryPeer {
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match &self.frames {
            Some(frames) => frames.send(frame).await.map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::Text(text.into())).await
    }

    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = serde_json::to_string(envelope).map_err(|e| TransportError::Write(e.to_string()))?;
        self.send_text(text).await
    }

    /// Half-close: the server side reads end-of-stream
    pub fn hang_up(&mut self) {
        self.frames = None;
    }

    /// Next event written by the server; `None` once the sink is dropped
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.events.recv().await
    }

    /// Next decoded envelope, skipping pings and splitting batches
    pub async fn recv_envelopes(&mut self) -> Option<Vec<Envelope>> {
        loop {
            match self.recv().await? {
                PeerEvent::Batch(frames) => {
                    return Some(
                        frames
                            .iter()
                            .filter_map(|f| serde_json::from_str(f).ok())
                            .collect(),
                    )
                }
                PeerEvent::Ping => continue,
                PeerEvent::Closed => return None,
            }
        }
    }
}
