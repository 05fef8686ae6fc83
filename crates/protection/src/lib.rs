//! Screen Protection - capture protection manager for Screenguard
//!
//! Records protection intent, drives a platform enforcer to make it real,
//! and re-asserts it whenever an application lifecycle transition may have
//! reset it.

mod bridge;
mod config;
mod error;
mod manager;
mod reconciler;
mod store;

pub use bridge::*;
pub use config::*;
pub use error::*;
pub use manager::*;
pub use reconciler::*;
pub use store::*;
