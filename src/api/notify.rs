//! Multi-channel notification endpoint.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelKind, Notification};
use crate::error::Result;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    #[serde(flatten)]
    pub notification: Notification,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::InApp]
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub success: bool,
    pub delivered: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub results: Vec<ChannelOutcome>,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/v1/notify
///
/// Each requested channel is attempted independently; `success` is true when
/// at least one reached the user.
#[tracing::instrument(
    name = "http.notify",
    skip(state, request),
    fields(user_id = request.notification.user_id, channels = request.channels.len())
)]
pub async fn notify(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>> {
    let results: Vec<ChannelOutcome> = state
        .channels
        .deliver(&request.notification, &request.channels)
        .await
        .into_iter()
        .map(|(channel, result)| match result {
            Ok(report) => ChannelOutcome {
                channel,
                success: report.delivered > 0,
                delivered: report.delivered,
                error: None,
            },
            Err(e) => ChannelOutcome {
                channel,
                success: false,
                delivered: 0,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(NotifyResponse {
        success: results.iter().any(|r| r.success),
        results,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channels_default_to_in_app() {
        let request: NotifyRequest = serde_json::from_value(json!({
            "user_id": 3,
            "title": "Payment received"
        }))
        .unwrap();
        assert_eq!(request.notification.user_id, 3);
        assert_eq!(request.channels, vec![ChannelKind::InApp]);

        let request: NotifyRequest = serde_json::from_value(json!({
            "user_id": 3,
            "title": "Payment received",
            "channels": ["in_app", "email"]
        }))
        .unwrap();
        assert_eq!(request.channels, vec![ChannelKind::InApp, ChannelKind::Email]);
    }
}
