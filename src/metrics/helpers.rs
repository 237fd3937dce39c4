//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCAST_SATURATED_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED, CONNECTIONS_OPENED,
    CONNECTION_DURATION, HEARTBEAT_TIMEOUTS, INBOUND_MESSAGES_TOTAL, MESSAGES_DROPPED_TOTAL,
    MESSAGES_ENQUEUED_TOTAL, MESSAGES_SENT_TOTAL, OUTBOUND_BATCH_SIZE, SLOW_CONSUMER_DISCONNECTS,
    TOPICS_ACTIVE, USERS_CONNECTED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(reason: &str, lifetime_secs: f64) {
        CONNECTIONS_CLOSED.with_label_values(&[reason]).inc();
        CONNECTION_DURATION.observe(lifetime_secs);
    }

    /// Refresh registry gauges after a mutation
    pub fn set_registry_sizes(connections: usize, users: usize, topics: usize) {
        CONNECTIONS_ACTIVE.set(connections as i64);
        USERS_CONNECTED.set(users as i64);
        TOPICS_ACTIVE.set(topics as i64);
    }
}

/// Helper struct for recording message metrics
pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_user_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["user"]).inc();
    }

    pub fn record_topic_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["topic"]).inc();
    }

    pub fn record_broadcast_sent() {
        MESSAGES_SENT_TOTAL.with_label_values(&["broadcast"]).inc();
    }

    pub fn record_enqueued(count: u64) {
        MESSAGES_ENQUEUED_TOTAL.inc_by(count);
    }

    pub fn record_dropped(count: u64) {
        MESSAGES_DROPPED_TOTAL.inc_by(count);
    }

    pub fn record_broadcast_saturated() {
        BROADCAST_SATURATED_TOTAL.inc();
    }

    pub fn record_batch(frames: usize) {
        OUTBOUND_BATCH_SIZE.observe(frames as f64);
    }
}

/// Helper struct for recording client message metrics
pub struct InboundMetrics;

impl InboundMetrics {
    pub fn record(kind: &str) {
        INBOUND_MESSAGES_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording liveness metrics
pub struct LivenessMetrics;

impl LivenessMetrics {
    pub fn record_slow_consumer() {
        SLOW_CONSUMER_DISCONNECTS.inc();
    }

    pub fn record_heartbeat_timeout() {
        HEARTBEAT_TIMEOUTS.inc();
    }
}
