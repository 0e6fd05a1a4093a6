//! Typed error hierarchy for the progression engine.
//!
//! Three top-level enums cover the three subsystems:
//! - `ServiceError` — checkpoint state machine failures
//! - `BridgeError` — editor/sandbox message channel failures
//! - `SessionError` — progression coordinator failures
//!
//! A missing step or checkpoint is never an error: state machine operations
//! return `Ok(None)` / `Ok(false)` for absent ids.

use thiserror::Error;

use crate::store::models::Role;

/// Errors from the checkpoint state machine.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Operation requires at least the {required} role")]
    Unauthorized { required: Role },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the editor/sandbox bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Sandbox channel closed")]
    ChannelClosed,

    #[error("Failed to serialize asset buffer: {0}")]
    AssetEncode(#[source] serde_json::Error),

    #[error("Step has no runnable entry file")]
    NoEntryFile,
}

/// Errors from the progression coordinator.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
