//! In-memory real-time message hub.
//!
//! Clients hold long-lived duplex connections; the hub tracks which user and
//! which topics each connection belongs to and fans server- or peer-originated
//! envelopes out to them without ever letting one slow peer hold up the rest.

// Core
pub mod connection;
pub mod hub;
pub mod message;
pub mod session;
pub mod transport;

// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Edge
pub mod api;
pub mod auth;
pub mod channel;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
