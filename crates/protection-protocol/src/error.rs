//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown lifecycle event: {0}")]
    UnknownLifecycleEvent(String),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
