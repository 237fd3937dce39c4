mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::{api_key_auth, extract_bearer_token, API_KEY_HEADER};
pub use state::AppState;
