//! API layer - HTTP endpoint handlers organized by concern.

mod health;
mod metrics;
mod notify;
mod routes;
mod send;
mod users;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use notify::{notify, NotifyResponse};
pub use routes::api_routes;
pub use send::{broadcast, send_to_topic, send_to_user, SendResponse};
pub use users::{connected_users, user_online};
