//! Shared Protocol Definitions for Screenguard
//!
//! This crate contains the lifecycle, status, and event types shared
//! between the enforcement layer, the protection manager, and the host bridge.

mod error;
mod events;
mod lifecycle;
mod status;

pub use error::*;
pub use events::*;
pub use lifecycle::*;
pub use status::*;

/// Bridge version reported to the host application
pub const BRIDGE_VERSION: &str = "1.0.0";
