//! In-process enforcer for hosts without a native capability

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::{EnforcerError, EnforcerResult, ScreenEnforcer};

/// Simulated capture enforcer
///
/// Tracks the requested state in memory. Failures can be injected either
/// once (queued) or persistently (sticky) to exercise retry and
/// degradation paths.
#[derive(Debug, Default)]
pub struct SimulatedEnforcer {
    os_state: AtomicBool,
    latency: Duration,
    queued_failures: Mutex<VecDeque<EnforcerError>>,
    sticky_failure: Mutex<Option<EnforcerError>>,
    apply_calls: AtomicU64,
}

impl SimulatedEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every apply call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next apply call with `error`
    pub fn queue_failure(&self, error: EnforcerError) {
        self.queued_failures.lock().push_back(error);
    }

    /// Fail every apply call with `error` until cleared
    pub fn fail_always(&self, error: EnforcerError) {
        *self.sticky_failure.lock() = Some(error);
    }

    pub fn clear_failures(&self) {
        self.queued_failures.lock().clear();
        *self.sticky_failure.lock() = None;
    }

    /// Model the OS silently dropping or changing enforcement
    pub fn simulate_os_reset(&self, state: bool) {
        debug!("Simulated OS reset: capture protection now {}", state);
        self.os_state.store(state, Ordering::SeqCst);
    }

    /// Total apply calls, including failed ones
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

impl ScreenEnforcer for SimulatedEnforcer {
    fn platform(&self) -> &'static str {
        std::env::consts::OS
    }

    fn is_native(&self) -> bool {
        false
    }

    fn apply(&self, enabled: bool) -> EnforcerResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if let Some(error) = self.queued_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.sticky_failure.lock().clone() {
            return Err(error);
        }

        self.os_state.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn query(&self) -> bool {
        self.os_state.load(Ordering::SeqCst)
    }

    fn can_query(&self) -> bool {
        true
    }
}
