use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

/// Smallest outbound queue that holds what registration enqueues (the
/// welcome and the user's own presence notice)
pub const MIN_OUTBOUND_QUEUE_CAPACITY: usize = 2;

/// Tuning for the in-memory hub and its per-connection pumps
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Capacity of the hub's broadcast intake queue
    #[serde(default = "default_broadcast_queue_capacity")]
    pub broadcast_queue_capacity: usize,
    /// Ping cadence of the outbound pump, in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Peer silence after which a connection is dropped, in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Cadence of the hub liveness sweep, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Soft cap on topics per connection
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,
    /// Maximum frames coalesced into a single write
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_broadcast_queue_capacity() -> usize {
    1024
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_connection_timeout_ms() -> u64 {
    90_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_max_batch_size() -> usize {
    64
}

impl HubConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject values the pumps cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_queue_capacity < MIN_OUTBOUND_QUEUE_CAPACITY {
            return Err(ConfigError::Message(format!(
                "hub.outbound_queue_capacity must be at least {}",
                MIN_OUTBOUND_QUEUE_CAPACITY
            )));
        }
        if self.broadcast_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "hub.broadcast_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.sweep_interval_ms == 0 {
            return Err(ConfigError::Message(
                "hub intervals must be greater than zero".into(),
            ));
        }
        if self.connection_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::Message(format!(
                "hub.connection_timeout_ms ({}) must exceed hub.heartbeat_interval_ms ({})",
                self.connection_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Message(
                "hub.max_batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "realtime-hub".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("hub.outbound_queue_capacity", 256)?
            .set_default("hub.broadcast_queue_capacity", 1024)?
            .set_default("hub.heartbeat_interval_ms", 30_000)?
            .set_default("hub.connection_timeout_ms", 90_000)?
            .set_default("hub.sweep_interval_ms", 60_000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, JWT__SECRET, HUB__HEARTBEAT_INTERVAL_MS, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.hub.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_queue_capacity(),
            broadcast_queue_capacity: default_broadcast_queue_capacity(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
