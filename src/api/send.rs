//! Server-originated delivery endpoints.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::UserId;
use crate::error::{AppError, Result};
use crate::hub::{topic::is_valid_topic_name, DeliveryReport};
use crate::message::{Envelope, Payload};
use crate::server::AppState;

/// `{"user_id": 7, "type": "notification", "data": {...}}`
#[derive(Debug, Deserialize)]
pub struct SendToUserRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SendToTopicRequest {
    pub topic: String,
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<Uuid>,
    pub delivered: usize,
    pub dropped: usize,
    pub timestamp: DateTime<Utc>,
}

impl SendResponse {
    fn from_report(message_id: Option<Uuid>, report: &DeliveryReport) -> Self {
        Self {
            success: report.delivered > 0,
            message_id,
            delivered: report.delivered,
            dropped: report.dropped.len(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub queued: bool,
    pub message_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Control kinds only make sense on a client connection
fn build_envelope(payload: Payload, metadata: HashMap<String, String>) -> Result<Envelope> {
    if matches!(
        payload,
        Payload::Subscribe(_) | Payload::Unsubscribe(_) | Payload::Heartbeat
    ) {
        return Err(AppError::Validation(format!(
            "Message type '{}' cannot be sent through the API",
            payload.kind()
        )));
    }

    let mut envelope = Envelope::new(payload).with_id();
    envelope.metadata = metadata;
    Ok(envelope)
}

/// POST /api/v1/send/user
#[tracing::instrument(
    name = "http.send_to_user",
    skip(state, request),
    fields(user_id = request.user_id, kind = %request.payload.kind())
)]
pub async fn send_to_user(
    State(state): State<AppState>,
    Json(request): Json<SendToUserRequest>,
) -> Result<Json<SendResponse>> {
    let envelope = build_envelope(request.payload, request.metadata)?;
    let message_id = envelope.message_id;

    let report = state.hub.send_to_user(request.user_id, envelope).await?;
    Ok(Json(SendResponse::from_report(message_id, &report)))
}

/// POST /api/v1/send/topic
#[tracing::instrument(
    name = "http.send_to_topic",
    skip(state, request),
    fields(topic = %request.topic, kind = %request.payload.kind())
)]
pub async fn send_to_topic(
    State(state): State<AppState>,
    Json(request): Json<SendToTopicRequest>,
) -> Result<Json<SendResponse>> {
    if !is_valid_topic_name(&request.topic) {
        return Err(AppError::Validation(format!(
            "Invalid topic name: {}",
            request.topic
        )));
    }

    let envelope = build_envelope(request.payload, request.metadata)?;
    let message_id = envelope.message_id;

    let report = state.hub.send_to_topic(&request.topic, envelope).await?;
    Ok(Json(SendResponse::from_report(message_id, &report)))
}

/// POST /api/v1/broadcast
///
/// Accepted once queued on the hub's broadcast intake; 503 when the intake
/// is saturated.
#[tracing::instrument(
    name = "http.broadcast",
    skip(state, request),
    fields(kind = %request.payload.kind())
)]
pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<BroadcastResponse>)> {
    let envelope = build_envelope(request.payload, request.metadata)?;
    let message_id = envelope.message_id;

    state.hub.broadcast_all(envelope)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BroadcastResponse {
            queued: true,
            message_id,
            timestamp: Utc::now(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TopicPayload;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request: SendToUserRequest = serde_json::from_value(json!({
            "user_id": 7,
            "type": "notification",
            "data": {"title": "Hello", "body": "World"},
            "metadata": {"source": "billing"}
        }))
        .unwrap();

        assert_eq!(request.user_id, 7);
        assert_eq!(request.payload.kind().as_str(), "notification");
        assert_eq!(request.metadata.get("source").map(String::as_str), Some("billing"));
    }

    #[test]
    fn test_control_kinds_rejected() {
        let result = build_envelope(
            Payload::Subscribe(TopicPayload {
                topic: "chat_1".into(),
            }),
            HashMap::new(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(build_envelope(Payload::Heartbeat, HashMap::new()).is_err());
    }

    #[test]
    fn test_envelope_gets_id() {
        let envelope = build_envelope(
            serde_json::from_value(json!({"type": "order_update", "data": {"order_id": "o-1", "status": "paid"}}))
                .unwrap(),
            HashMap::new(),
        )
        .unwrap();
        assert!(envelope.message_id.is_some());
    }
}
