// SluiceConn error types

use sluicestream::SluiceStreamError;
use thiserror::Error;

/// Top-level error type for the SluiceConn crate.
#[derive(Debug, Error)]
pub enum SluiceConnError {
    // ── Transport errors ────────────────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection is closed")]
    ConnectionClosed,

    // ── Handshake errors ────────────────────────────────────────────────
    #[error("invalid handshake state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // ── Session errors ──────────────────────────────────────────────────
    #[error(transparent)]
    Stream(#[from] SluiceStreamError),

    // ── Configuration errors ────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, SluiceConnError>;
