//! Enforcer error types

use thiserror::Error;

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on a later attempt
    Transient,
    /// Will not succeed without outside change
    Permanent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnforcerError {
    #[error("Platform busy: {0}")]
    Busy(String),

    #[error("No window available to protect")]
    NoWindow,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture protection unsupported: {0}")]
    Unsupported(String),

    #[error("Platform not supported")]
    UnsupportedPlatform,

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnforcerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EnforcerError::Busy(_) | EnforcerError::NoWindow | EnforcerError::Platform(_) => {
                ErrorClass::Transient
            }
            EnforcerError::PermissionDenied(_)
            | EnforcerError::Unsupported(_)
            | EnforcerError::UnsupportedPlatform
            | EnforcerError::InvalidTarget(_)
            | EnforcerError::Internal(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

pub type EnforcerResult<T> = Result<T, EnforcerError>;
