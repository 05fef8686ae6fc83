//! Protection state store - the single source of truth
//!
//! Every mutation is a short, generation-tagged critical section. Nothing
//! here calls into the enforcer, so the lock is never held across a
//! platform call.

use parking_lot::Mutex;
use std::time::Instant;
use tracing::debug;

use protection_protocol::{ProtectionPhase, ProtectionStatus};

/// Enforcement failure recorded against a generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub generation: u64,
    pub message: String,
    pub permanent: bool,
    pub attempts: u32,
}

/// Protection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionState {
    /// Most recently requested value
    pub desired: bool,
    /// Value of the last completed, non-stale apply (None until the first one)
    pub last_applied: Option<bool>,
    pub last_applied_at: Option<Instant>,
    /// Bumped on every desired-state change
    pub generation: u64,
    /// Generation `last_applied` belongs to
    pub applied_generation: Option<u64>,
    /// Failure recorded after the last successful apply, if any
    pub failure: Option<FailureRecord>,
}

impl ProtectionState {
    fn initial(desired: bool) -> Self {
        Self {
            desired,
            last_applied: None,
            last_applied_at: None,
            generation: 0,
            applied_generation: None,
            failure: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|f| f.generation == self.generation)
    }

    /// The enforcer applied `desired` in the current generation and
    /// nothing has failed since
    pub fn is_confirmed(&self) -> bool {
        self.applied_generation == Some(self.generation)
            && self.last_applied == Some(self.desired)
            && !self.is_degraded()
    }

    pub fn phase(&self) -> ProtectionPhase {
        if self.is_degraded() {
            ProtectionPhase::Degraded
        } else if self.is_confirmed() {
            ProtectionPhase::settled(self.desired)
        } else {
            ProtectionPhase::pending(self.desired)
        }
    }

    pub fn status(&self) -> ProtectionStatus {
        ProtectionStatus {
            desired: self.desired,
            confirmed: self.is_confirmed(),
            degraded: self.is_degraded(),
            phase: self.phase(),
            generation: self.generation,
        }
    }
}

/// Desired value tagged with the generation that requested it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    pub desired: bool,
    pub generation: u64,
}

/// Protection state store
#[derive(Debug)]
pub struct StateStore {
    state: Mutex<ProtectionState>,
}

impl StateStore {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            state: Mutex::new(ProtectionState::initial(default_enabled)),
        }
    }

    /// Record a new desired value and return the generation it created
    pub fn set_desired(&self, enabled: bool) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.desired = enabled;
        state.failure = None;
        debug!(
            "Intent recorded: desired={}, generation={}",
            enabled, state.generation
        );
        state.generation
    }

    /// Record a completed apply. Returns false (and changes nothing) when
    /// `generation` is no longer current.
    pub fn record_applied(&self, enabled: bool, generation: u64) -> bool {
        let mut state = self.state.lock();
        if generation != state.generation {
            return false;
        }
        state.last_applied = Some(enabled);
        state.last_applied_at = Some(Instant::now());
        state.applied_generation = Some(generation);
        state.failure = None;
        true
    }

    /// Record a failed enforcement. Returns false when `generation` is stale.
    pub fn record_failure(&self, failure: FailureRecord) -> bool {
        let mut state = self.state.lock();
        if failure.generation != state.generation {
            return false;
        }
        state.failure = Some(failure);
        true
    }

    /// Current desired value and its generation, read atomically
    pub fn intent(&self) -> Intent {
        let state = self.state.lock();
        Intent {
            desired: state.desired,
            generation: state.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn snapshot(&self) -> ProtectionState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> ProtectionStatus {
        self.state.lock().status()
    }
}
