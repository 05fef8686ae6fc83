//! Capture Enforcer - Platform-native screen capture suppression for Screenguard
//!
//! Provides abstraction over platform-specific capture-blocking APIs:
//! - macOS: `NSWindow` sharing type
//! - Windows: window display affinity
//!
//! Other platforms have no native capability; hosts there can fall back
//! to [`SimulatedEnforcer`], which only tracks the requested state.

mod error;
mod simulated;
mod traits;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use error::*;
pub use simulated::*;
pub use traits::*;

#[cfg(target_os = "macos")]
pub use macos::MacOSEnforcer;

#[cfg(target_os = "windows")]
pub use windows::WindowsEnforcer;

/// Create a platform-appropriate enforcer instance
pub fn create_enforcer(config: &EnforcerConfig) -> EnforcerResult<Box<dyn ScreenEnforcer>> {
    #[cfg(target_os = "macos")]
    {
        let _ = config;
        Ok(Box::new(MacOSEnforcer::new()))
    }

    #[cfg(target_os = "windows")]
    {
        let hwnd = config.window_handle.ok_or_else(|| {
            EnforcerError::InvalidTarget("a window handle is required on Windows".to_string())
        })?;
        Ok(Box::new(WindowsEnforcer::new(hwnd)?))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = config;
        Err(EnforcerError::UnsupportedPlatform)
    }
}
