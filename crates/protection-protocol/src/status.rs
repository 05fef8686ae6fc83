//! Protection status reported to callers

use serde::{Deserialize, Serialize};

/// Protection state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionPhase {
    /// Capture allowed, confirmed by the enforcer
    Disabled,
    /// Protection requested, not yet confirmed
    Enabling,
    /// Capture blocked, confirmed by the enforcer
    Enabled,
    /// Protection lifted by request, not yet confirmed
    Disabling,
    /// Intent is known but the enforcer reported failure
    Degraded,
}

impl ProtectionPhase {
    /// Phase while an apply for `desired` is outstanding
    pub fn pending(desired: bool) -> Self {
        if desired { Self::Enabling } else { Self::Disabling }
    }

    /// Phase once an apply for `desired` is confirmed
    pub fn settled(desired: bool) -> Self {
        if desired { Self::Enabled } else { Self::Disabled }
    }

    pub fn is_settled(self) -> bool {
        matches!(self, Self::Enabled | Self::Disabled)
    }
}

/// Status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    /// Most recently requested value
    pub desired: bool,
    /// Enforcer confirmed `desired` for the current generation
    pub confirmed: bool,
    /// Enforcement is failing for the current generation
    pub degraded: bool,
    pub phase: ProtectionPhase,
    pub generation: u64,
}

impl ProtectionStatus {
    /// Capture is blocked and the platform confirmed it
    pub fn is_protected(&self) -> bool {
        self.confirmed && self.desired
    }
}

/// Platform information for the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub platform: String,
    pub has_native_enforcer: bool,
    pub is_enabled: bool,
    pub version: String,
}
