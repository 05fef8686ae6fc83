//! Application lifecycle notifications

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Lifecycle transition reported by the host OS
///
/// Produced by the platform lifecycle channel and consumed by the
/// reconciler. Any transition after which the OS may have dropped
/// capture restrictions is a reason to re-assert them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// App returned to the foreground (also after a system overlay)
    ForegroundEntered,
    /// App moved to the background
    BackgroundEntered,
    /// Displays were attached, detached, mirrored, or reconfigured
    DisplayConfigurationChanged,
}

impl LifecycleEvent {
    /// Whether this transition may have reset OS-level enforcement
    pub fn requires_reassertion(self) -> bool {
        matches!(
            self,
            LifecycleEvent::ForegroundEntered | LifecycleEvent::DisplayConfigurationChanged
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::ForegroundEntered => "foreground",
            LifecycleEvent::BackgroundEntered => "background",
            LifecycleEvent::DisplayConfigurationChanged => "display_changed",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "foreground" | "active" | "foreground_entered" => Ok(Self::ForegroundEntered),
            "background" | "inactive" | "background_entered" => Ok(Self::BackgroundEntered),
            "display" | "display_changed" | "display_configuration_changed" => {
                Ok(Self::DisplayConfigurationChanged)
            }
            _ => Err(ProtocolError::UnknownLifecycleEvent(s.to_string())),
        }
    }
}
