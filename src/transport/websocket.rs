use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::error::TransportError;
use crate::message::OutboundMessage;

use super::{Frame, FrameSink, FrameStream, Transport};

/// Upgraded axum WebSocket
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for WebSocketTransport {
    type Sink = WebSocketSink;
    type Stream = WebSocketStream;

    fn split(self) -> (Self::Sink, Self::Stream) {
        let (sender, receiver) = self.socket.split();
        (WebSocketSink { sender }, WebSocketStream { receiver })
    }
}

pub struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_batch(&mut self, batch: &[OutboundMessage]) -> Result<(), TransportError> {
        for message in batch {
            self.sender
                .feed(Message::Text(message.as_str().into()))
                .await
                .map_err(|e| TransportError::Write(e.to_string()))?;
        }
        self.sender
            .flush()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sender
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sender
            .close()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

pub struct WebSocketStream {
    receiver: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameStream for WebSocketStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = match self.receiver.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
        };

        let frame = match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(data) => Frame::Ping(data.to_vec()),
            Message::Pong(data) => Frame::Pong(data.to_vec()),
            Message::Close(_) => Frame::Close,
        };
        Some(Ok(frame))
    }
}
