use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::HubConfig;
use crate::connection::{CloseReason, Connection};
use crate::message::OutboundMessage;
use crate::metrics::MessageMetrics;
use crate::transport::FrameSink;

/// Upper bound on closing a sink whose peer may have stalled
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write loop: drains the queue in coalesced batches and sends heartbeats.
/// Returns `None` when the connection was closed elsewhere.
pub(super) async fn run<S: FrameSink>(
    conn: Arc<Connection>,
    mut queue: mpsc::Receiver<OutboundMessage>,
    mut sink: S,
    config: HubConfig,
) -> Option<CloseReason> {
    let mut heartbeat_timer = tokio::time::interval(config.heartbeat_interval());
    let timeout = config.connection_timeout();
    let max_batch = config.max_batch_size.max(1);
    let mut batch: Vec<OutboundMessage> = Vec::with_capacity(max_batch);

    // Skip immediate first tick
    heartbeat_timer.tick().await;

    let reason = loop {
        tokio::select! {
            _ = conn.closed() => break None,
            message = queue.recv() => {
                let Some(message) = message else { break None };
                batch.push(message);
                while batch.len() < max_batch {
                    match queue.try_recv() {
                        Ok(message) => batch.push(message),
                        Err(_) => break,
                    }
                }
                MessageMetrics::record_batch(batch.len());

                // A stalled write must not outlive deregistration
                let written = tokio::select! {
                    _ = conn.closed() => None,
                    result = sink.send_batch(&batch) => Some(result),
                };
                batch.clear();

                match written {
                    None => break None,
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %conn.id, error = %e, "Connection write failed");
                        break Some(CloseReason::TransportError);
                    }
                    Some(Ok(())) => {}
                }
            }
            _ = heartbeat_timer.tick() => {
                let idle = conn.idle_for();
                if idle > timeout {
                    tracing::info!(
                        connection_id = %conn.id,
                        idle_ms = idle.as_millis() as u64,
                        "Peer silent past timeout"
                    );
                    break Some(CloseReason::HeartbeatTimeout);
                }

                let pinged = tokio::select! {
                    _ = conn.closed() => None,
                    result = sink.ping() => Some(result),
                };
                match pinged {
                    None => break None,
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %conn.id, error = %e, "Heartbeat send failed");
                        break Some(CloseReason::TransportError);
                    }
                    Some(Ok(())) => {}
                }
            }
        }
    };

    queue.close();
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        tracing::debug!(connection_id = %conn.id, "Timed out closing connection");
    }
    reason
}
