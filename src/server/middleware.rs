use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

use super::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Guards the delivery API with the configured `api.key`.
/// Open when no key is configured.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.settings.api.key.as_deref() else {
        return Ok(next.run(req).await);
    };

    match req.headers().get(API_KEY_HEADER).map(|v| v.to_str()) {
        Some(Ok(key)) if key == expected => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected request with invalid API key");
            Err(AppError::Auth("Invalid API key".into()))
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Rejected request without API key");
            Err(AppError::Auth("Missing API key".into()))
        }
    }
}

/// Token from an `Authorization: Bearer` header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
