//! Outcome notifications published by the protection manager

use serde::{Deserialize, Serialize};

use crate::LifecycleEvent;

/// Protection outcome event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtectionEvent {
    /// The enforcer applied `enabled` for `generation`
    Applied { generation: u64, enabled: bool },
    /// A result for `generation` arrived after a newer request and was dropped
    Superseded { generation: u64 },
    /// Enforcement for `generation` gave up
    Failed {
        generation: u64,
        enabled: bool,
        error: String,
        permanent: bool,
        attempts: u32,
    },
    /// A lifecycle transition was observed
    Lifecycle { event: LifecycleEvent },
}

impl ProtectionEvent {
    pub fn generation(&self) -> Option<u64> {
        match self {
            ProtectionEvent::Applied { generation, .. }
            | ProtectionEvent::Superseded { generation }
            | ProtectionEvent::Failed { generation, .. } => Some(*generation),
            ProtectionEvent::Lifecycle { .. } => None,
        }
    }
}
