//! Presence queries.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection::UserId;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct UserPresenceResponse {
    pub user_id: UserId,
    pub online: bool,
    pub connection_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ConnectedUsersResponse {
    pub users: Vec<UserId>,
    pub total: usize,
}

/// GET /api/v1/users/{user_id}/online
pub async fn user_online(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Json<UserPresenceResponse> {
    let connection_count = state.hub.user_connection_count(user_id).await;
    Json(UserPresenceResponse {
        user_id,
        online: connection_count > 0,
        connection_count,
    })
}

/// GET /api/v1/users
pub async fn connected_users(State(state): State<AppState>) -> Json<ConnectedUsersResponse> {
    let users = state.hub.connected_users().await;
    let total = users.len();
    Json(ConnectedUsersResponse { users, total })
}
