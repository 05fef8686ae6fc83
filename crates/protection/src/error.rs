//! Protection manager error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtectionError {
    #[error("No async runtime available to host the protection manager")]
    NoRuntime,

    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("Protection manager stopped")]
    Stopped,

    #[error("Enforcer error: {0}")]
    Enforcer(#[from] enforcer::EnforcerError),
}

pub type ProtectionResult<T> = Result<T, ProtectionError>;
