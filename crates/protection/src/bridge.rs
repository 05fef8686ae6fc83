//! Host bridge surface
//!
//! The methods a host application shell calls. Results are plain values
//! or serializable errors so they can cross any marshaling layer.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use protection_protocol::{
    BRIDGE_VERSION, LifecycleEvent, PlatformInfo, ProtectionStatus, ProtocolError,
};

use crate::ProtectionManager;

/// Error type for bridge calls
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Screen protection unavailable: {0}")]
    Unavailable(String),
}

impl serde::Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Screen protection bridge
#[derive(Clone)]
pub struct ScreenProtectionBridge {
    manager: Arc<ProtectionManager>,
}

impl ScreenProtectionBridge {
    pub fn new(manager: Arc<ProtectionManager>) -> Self {
        Self { manager }
    }

    pub fn enable_screen_protection(&self) {
        info!("Bridge: enable screen protection");
        self.manager.enable();
    }

    pub fn disable_screen_protection(&self) {
        info!("Bridge: disable screen protection");
        self.manager.disable();
    }

    /// True only when protection is requested and confirmed
    pub fn is_screen_protection_enabled(&self) -> bool {
        self.manager.is_enabled()
    }

    pub fn status(&self) -> ProtectionStatus {
        self.manager.status()
    }

    /// Whether a native capture-blocking capability backs this bridge
    pub fn is_supported(&self) -> bool {
        self.manager.enforcer().is_native()
    }

    pub fn platform_info(&self) -> PlatformInfo {
        let enforcer = self.manager.enforcer();
        PlatformInfo {
            platform: enforcer.platform().to_string(),
            has_native_enforcer: enforcer.is_native(),
            is_enabled: self.manager.is_enabled(),
            version: BRIDGE_VERSION.to_string(),
        }
    }

    /// Forward a host lifecycle notification by name
    pub fn notify_lifecycle(&self, name: &str) -> BridgeResult<()> {
        let event: LifecycleEvent = name.parse()?;
        debug!("Bridge: lifecycle {}", event);
        self.manager
            .notify_lifecycle(event)
            .map_err(|e| BridgeError::Unavailable(e.to_string()))
    }
}
