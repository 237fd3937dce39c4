use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::health::{health, stats};
use super::notify::notify;
use super::send::{broadcast, send_to_topic, send_to_user};
use super::users::{connected_users, user_online};

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .nest(
            "/api/v1",
            Router::new()
                // Delivery
                .route("/send/user", post(send_to_user))
                .route("/send/topic", post(send_to_topic))
                .route("/broadcast", post(broadcast))
                .route("/notify", post(notify))
                // Presence
                .route("/users", get(connected_users))
                .route("/users/{user_id}/online", get(user_online))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
