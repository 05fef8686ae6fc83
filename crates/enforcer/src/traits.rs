//! Capture enforcer trait abstraction

use crate::EnforcerResult;

/// Enforcer configuration
#[derive(Debug, Clone, Default)]
pub struct EnforcerConfig {
    /// Native window handle to protect (required on Windows, ignored on macOS)
    pub window_handle: Option<isize>,
}

/// Screen capture enforcer trait
///
/// Implementations wrap one platform primitive. Calls are synchronous and
/// may take time; callers must not hold locks across them.
pub trait ScreenEnforcer: Send + Sync {
    /// Short platform name reported to the host
    fn platform(&self) -> &'static str;

    /// Whether this enforcer drives a real OS capability
    fn is_native(&self) -> bool {
        true
    }

    /// Turn capture protection on or off.
    ///
    /// Applying the value already in effect is a cheap no-op, not an error.
    fn apply(&self, enabled: bool) -> EnforcerResult<()>;

    /// Best-effort read of the OS-level state.
    ///
    /// Enforcers that cannot read back return the last value they applied.
    fn query(&self) -> bool;

    /// Whether [`ScreenEnforcer::query`] reads real OS state
    fn can_query(&self) -> bool {
        false
    }
}
