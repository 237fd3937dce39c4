use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::connection::{ConnectionId, UserId};

/// Conditions reported by hub operations.
///
/// None of these abort unrelated sends: routing and capacity conditions are
/// returned to the caller of the one operation that hit them.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("No live recipients for {target}")]
    NoRecipients { target: String },

    #[error("Broadcast intake is saturated")]
    BroadcastSaturated,

    #[error("Hub is shut down")]
    HubClosed,

    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid topic name: {0}")]
    InvalidTopic(String),

    #[error("Topic {0} is managed by the hub and cannot be changed")]
    ProtectedTopic(String),

    #[error("Subscription limit reached ({limit})")]
    SubscriptionLimit { limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HubError {
    pub fn no_user(user_id: UserId) -> Self {
        Self::NoRecipients {
            target: format!("user {}", user_id),
        }
    }

    /// Short machine-readable code used in `error` envelopes
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoRecipients { .. } => "NO_RECIPIENTS",
            Self::BroadcastSaturated => "BROADCAST_SATURATED",
            Self::HubClosed => "HUB_CLOSED",
            Self::ConnectionClosed(_) => "CONNECTION_CLOSED",
            Self::UnknownConnection(_) => "UNKNOWN_CONNECTION",
            Self::InvalidTopic(_) => "INVALID_TOPIC",
            Self::ProtectedTopic(_) => "PROTECTED_TOPIC",
            Self::SubscriptionLimit { .. } => "SUBSCRIPTION_LIMIT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Failures of the underlying framed stream. Always fatal to one connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Stream closed by peer")]
    Closed,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Hub(#[from] HubError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), msg.clone()),
            AppError::Internal(e) => {
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    e.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, e.clone())
            }
            AppError::Hub(e) => {
                let status = match e {
                    HubError::NoRecipients { .. } | HubError::UnknownConnection(_) => {
                        StatusCode::NOT_FOUND
                    }
                    HubError::BroadcastSaturated | HubError::HubClosed => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    HubError::InvalidTopic(_)
                    | HubError::ProtectedTopic(_)
                    | HubError::SubscriptionLimit { .. } => StatusCode::BAD_REQUEST,
                    HubError::ConnectionClosed(_) => StatusCode::GONE,
                    HubError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code(), e.to_string(), e.to_string())
            }
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_error_codes() {
        assert_eq!(HubError::no_user(7).code(), "NO_RECIPIENTS");
        assert_eq!(HubError::BroadcastSaturated.code(), "BROADCAST_SATURATED");
        assert_eq!(
            HubError::ProtectedTopic("global".into()).to_string(),
            "Topic global is managed by the hub and cannot be changed"
        );
    }

    #[test]
    fn test_hub_error_status_mapping() {
        let response = AppError::from(HubError::no_user(1)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(HubError::BroadcastSaturated).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
