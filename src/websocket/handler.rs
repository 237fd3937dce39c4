use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::server::{extract_bearer_token, AppState};
use crate::session::Session;
use crate::transport::WebSocketTransport;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // Query parameter first, then Authorization header
    let token = query
        .token
        .as_deref()
        .or_else(|| extract_bearer_token(&headers));

    let Some(token) = token else {
        return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
    };

    let user = match state.jwt_validator.authenticate(token) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "JWT validation failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(user_id = user.user_id, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Serve an upgraded socket until it closes
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, user),
    fields(user_id = user.user_id, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let mut session = Session::new(state.hub.clone()).with_metadata(user.metadata);
    if let Some(forwarder) = &state.forwarder {
        session = session.with_forwarder(forwarder.clone());
    }

    let handle = session
        .start(user.user_id, WebSocketTransport::new(socket))
        .await;
    let connection_id = handle.connection.id;

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let reason = handle.wait().await;

    tracing::info!(
        connection_id = %connection_id,
        reason = reason.map(|r| r.as_str()).unwrap_or("closed_by_hub"),
        "WebSocket connection closed"
    );
}
