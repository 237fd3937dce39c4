//! Client connection handles.
//!
//! This module provides:
//! - The per-connection handle with its bounded outbound queue
//! - The connection lifecycle state machine
//! - Identity types shared across the crate

mod handle;
mod state;

pub use handle::{Connection, ConnectionId, EnqueueOutcome, UserId};
pub use state::{CloseReason, ConnectionState};
