mod settings;

pub use settings::{
    ApiConfig, HubConfig, JwtConfig, OtelConfig, ServerConfig, Settings,
    MIN_OUTBOUND_QUEUE_CAPACITY,
};
