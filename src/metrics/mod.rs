//! Prometheus metrics for the hub.
//!
//! This module provides metrics for monitoring the hub:
//! - Connection metrics (active connections, connected users, topics)
//! - Message metrics (sent by target, enqueued, dropped)
//! - Liveness metrics (slow-consumer disconnects, heartbeat timeouts)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, InboundMetrics, LivenessMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "hub";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of registered connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of registered connections"
    ).unwrap();

    /// Number of users with at least one connection
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of users with at least one live connection"
    ).unwrap();

    /// Topics with at least one subscriber
    pub static ref TOPICS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_topics_active", METRIC_PREFIX),
        "Number of topics with at least one subscriber"
    ).unwrap();

    /// Connections registered
    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total connections registered"
    ).unwrap();

    /// Connections deregistered, by reason
    pub static ref CONNECTIONS_CLOSED: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total connections deregistered",
        &["reason"]
    ).unwrap();

    /// Connection lifetime
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Connection lifetime in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Publish operations by target type
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total publish operations",
        &["target"]
    ).unwrap();

    /// Messages placed on outbound queues
    pub static ref MESSAGES_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_enqueued_total", METRIC_PREFIX),
        "Total messages placed on connection outbound queues"
    ).unwrap();

    /// Deliveries abandoned because the recipient queue was full
    pub static ref MESSAGES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_dropped_total", METRIC_PREFIX),
        "Total deliveries abandoned because the recipient was too slow"
    ).unwrap();

    /// Broadcast requests rejected because the intake was full
    pub static ref BROADCAST_SATURATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_broadcast_saturated_total", METRIC_PREFIX),
        "Total broadcast requests rejected by a full intake queue"
    ).unwrap();

    /// Frames per outbound write
    pub static ref OUTBOUND_BATCH_SIZE: Histogram = register_histogram!(
        format!("{}_outbound_batch_size", METRIC_PREFIX),
        "Number of frames coalesced into one outbound write",
        vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
    ).unwrap();

    /// Messages received from clients, by kind
    pub static ref INBOUND_MESSAGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_inbound_messages_total", METRIC_PREFIX),
        "Total messages received from clients",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Liveness Metrics
    // ============================================================================

    /// Connections dropped as slow consumers
    pub static ref SLOW_CONSUMER_DISCONNECTS: IntCounter = register_int_counter!(
        format!("{}_slow_consumer_disconnects_total", METRIC_PREFIX),
        "Total connections dropped because their outbound queue was full"
    ).unwrap();

    /// Connections dropped for peer silence
    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total connections dropped because the peer stopped responding"
    ).unwrap();
}
