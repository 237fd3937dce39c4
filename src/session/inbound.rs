use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::connection::{CloseReason, Connection};
use crate::error::HubError;
use crate::hub::{chat_topic, topic::is_valid_topic_name, user_topic, Hub};
use crate::message::{ChatPayload, Envelope, Payload, SuccessPayload, TypingPayload};
use crate::metrics::InboundMetrics;
use crate::transport::{Frame, FrameStream};

use super::InboundForwarder;

/// Read loop. Returns `None` when the connection was closed elsewhere.
pub(super) async fn run<R: FrameStream>(
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    mut stream: R,
    forwarder: Option<Arc<dyn InboundForwarder>>,
) -> Option<CloseReason> {
    let dispatcher = Dispatcher {
        hub,
        conn,
        forwarder,
    };

    loop {
        let frame = tokio::select! {
            _ = dispatcher.conn.closed() => return None,
            frame = stream.next_frame() => frame,
        };

        let frame = match frame {
            None => return Some(CloseReason::PeerClosed),
            Some(Err(e)) => {
                tracing::warn!(connection_id = %dispatcher.conn.id, error = %e, "Connection read failed");
                return Some(CloseReason::TransportError);
            }
            Some(Ok(frame)) => frame,
        };

        dispatcher.conn.update_activity();
        dispatcher.conn.mark_active();

        let open = match frame {
            Frame::Text(text) => dispatcher.handle_text(&text).await,
            Frame::Binary(_) => {
                dispatcher
                    .reply(Envelope::error(
                        "UNSUPPORTED_FORMAT",
                        "Binary messages are not supported",
                    ))
                    .await
            }
            Frame::Ping(_) | Frame::Pong(_) => true,
            Frame::Close => {
                tracing::debug!(connection_id = %dispatcher.conn.id, "Received close frame");
                return Some(CloseReason::PeerClosed);
            }
        };

        if !open {
            return None;
        }
    }
}

struct Dispatcher {
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    forwarder: Option<Arc<dyn InboundForwarder>>,
}

impl Dispatcher {
    /// Returns false once the connection has been closed
    async fn handle_text(&self, text: &str) -> bool {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                InboundMetrics::record("invalid");
                tracing::warn!(connection_id = %self.conn.id, error = %e, "Failed to parse client message");
                return self
                    .reply(Envelope::error("INVALID_MESSAGE", e.to_string()))
                    .await;
            }
        };

        InboundMetrics::record(envelope.kind().as_str());
        self.dispatch(envelope).await
    }

    #[tracing::instrument(
        name = "session.dispatch",
        skip(self, envelope),
        fields(
            connection_id = %self.conn.id,
            user_id = self.conn.user_id,
            kind = %envelope.kind()
        )
    )]
    async fn dispatch(&self, envelope: Envelope) -> bool {
        let Envelope {
            payload, metadata, ..
        } = envelope;
        match payload {
            Payload::Subscribe(request) => {
                let result = self.hub.subscribe(self.conn.id, &request.topic).await;
                self.acknowledge("subscribed", request.topic, result).await
            }
            Payload::Unsubscribe(request) => {
                let result = self.hub.unsubscribe(self.conn.id, &request.topic).await;
                self.acknowledge("unsubscribed", request.topic, result).await
            }
            Payload::Chat(chat) => self.relay_chat(chat, metadata).await,
            Payload::Typing(typing) => self.relay_typing(typing).await,
            Payload::Heartbeat => self.reply(Envelope::heartbeat()).await,
            payload => {
                let mut stamped = self.stamp(Envelope::new(payload));
                stamped.metadata = metadata;
                match &self.forwarder {
                    Some(forwarder) => forwarder.forward(&self.conn, stamped).await,
                    None => tracing::debug!("Ignoring inbound message with no route"),
                }
                true
            }
        }
    }

    async fn acknowledge(&self, action: &str, topic: String, result: Result<bool, HubError>) -> bool {
        match result {
            Ok(_) => {
                tracing::info!(connection_id = %self.conn.id, topic = %topic, "Topic membership {}", action);
                self.reply(Envelope::new(Payload::Success(SuccessPayload {
                    message: action.to_string(),
                    connection_id: None,
                    topic: Some(topic),
                })))
                .await
            }
            Err(e) => self.reply_error(&e).await,
        }
    }

    /// Re-publish to the session topic and the addressed user's personal topic
    async fn relay_chat(&self, chat: ChatPayload, metadata: HashMap<String, String>) -> bool {
        let session_topic = chat_topic(&chat.session_id);
        if !is_valid_topic_name(&session_topic) {
            return self
                .reply_error(&HubError::InvalidTopic(session_topic))
                .await;
        }

        let mut topics = vec![session_topic.clone()];
        if let Some(to_user_id) = chat.to_user_id {
            topics.push(user_topic(to_user_id));
        }

        let mut envelope = self.stamp(Envelope::new(Payload::Chat(chat)));
        envelope.topic = Some(session_topic);
        envelope.metadata = metadata;

        match self.hub.send_to_topics(&topics, envelope).await {
            Ok(report) => {
                tracing::debug!(delivered = report.delivered, "Chat relayed");
                !self.conn.is_closed()
            }
            Err(e) => self.reply_error(&e).await,
        }
    }

    async fn relay_typing(&self, typing: TypingPayload) -> bool {
        let session_topic = chat_topic(&typing.session_id);
        if !is_valid_topic_name(&session_topic) {
            return self
                .reply_error(&HubError::InvalidTopic(session_topic))
                .await;
        }

        let envelope = self.stamp(Envelope::new(Payload::Typing(typing)));
        match self.hub.send_to_topic(&session_topic, envelope).await {
            Ok(_) => !self.conn.is_closed(),
            Err(e) => self.reply_error(&e).await,
        }
    }

    /// Origin fields are always set by the server
    fn stamp(&self, mut envelope: Envelope) -> Envelope {
        envelope.from_user_id = Some(self.conn.user_id);
        envelope.timestamp = Utc::now();
        envelope.message_id = Some(Uuid::new_v4());
        envelope
    }

    async fn reply_error(&self, error: &HubError) -> bool {
        tracing::warn!(connection_id = %self.conn.id, error = %error, "Inbound request rejected");
        self.reply(Envelope::error(error.code(), error.to_string()))
            .await
    }

    async fn reply(&self, envelope: Envelope) -> bool {
        self.hub
            .send_to_connection(&self.conn, &envelope)
            .await
            .is_ok()
    }
}
