//! Lifecycle reconciler
//!
//! Re-asserts the desired state against the platform enforcer: after an
//! explicit request, after lifecycle transitions that may have reset
//! enforcement, and on periodic verification. Transient failures are
//! retried with bounded backoff; the attempt count is the only
//! cancellation there is.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use enforcer::{EnforcerError, EnforcerResult, ScreenEnforcer};
use protection_protocol::{LifecycleEvent, ProtectionEvent};

use crate::{FailureRecord, Intent, RetryPolicy, StateStore};

/// Why a reconciliation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    /// enable()/disable() or cold start
    Request,
    Lifecycle(LifecycleEvent),
    /// Explicit reconcile() call
    Manual,
    /// Verification tick; skips the apply when the platform already agrees
    Periodic,
    /// A superseded apply reached the platform after a newer one
    Repair,
}

impl ReconcileTrigger {
    /// Trigger for a lifecycle transition, if it warrants one
    pub fn for_lifecycle(event: LifecycleEvent) -> Option<Self> {
        event
            .requires_reassertion()
            .then_some(ReconcileTrigger::Lifecycle(event))
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The enforcer applied the intent and the store recorded it
    Applied,
    /// Periodic check found the platform already in the desired state
    Verified,
    /// A newer generation took over; `reached_platform` is true when the
    /// enforcer completed an apply for the stale intent anyway
    Superseded { reached_platform: bool },
    /// Gave up; the failure is recorded in the store
    Failed,
}

/// Lifecycle reconciler
pub struct Reconciler {
    store: Arc<StateStore>,
    enforcer: Arc<dyn ScreenEnforcer>,
    retry: RetryPolicy,
    events: broadcast::Sender<ProtectionEvent>,
}

impl Reconciler {
    pub fn new(
        store: Arc<StateStore>,
        enforcer: Arc<dyn ScreenEnforcer>,
        retry: RetryPolicy,
        events: broadcast::Sender<ProtectionEvent>,
    ) -> Self {
        Self {
            store,
            enforcer,
            retry,
            events,
        }
    }

    /// Drive the platform towards `intent`
    pub async fn reconcile(&self, intent: Intent, trigger: ReconcileTrigger) -> ReconcileOutcome {
        if trigger == ReconcileTrigger::Periodic && self.already_in_effect(intent).await {
            debug!("Verified: generation={} still in effect", intent.generation);
            return ReconcileOutcome::Verified;
        }

        debug!(
            "Reconciling: desired={}, generation={}, trigger={:?}",
            intent.desired, intent.generation, trigger
        );

        let mut attempt = 0u32;
        loop {
            if self.store.generation() != intent.generation {
                debug!(
                    "Generation {} superseded before attempt {}",
                    intent.generation,
                    attempt + 1
                );
                self.publish(ProtectionEvent::Superseded {
                    generation: intent.generation,
                });
                return ReconcileOutcome::Superseded {
                    reached_platform: false,
                };
            }

            attempt += 1;
            match self.apply(intent.desired).await {
                Ok(()) => {
                    if self.store.record_applied(intent.desired, intent.generation) {
                        info!(
                            "Capture protection {} (generation={}, attempt={})",
                            if intent.desired { "enabled" } else { "disabled" },
                            intent.generation,
                            attempt
                        );
                        self.publish(ProtectionEvent::Applied {
                            generation: intent.generation,
                            enabled: intent.desired,
                        });
                        return ReconcileOutcome::Applied;
                    }

                    debug!(
                        "Discarding stale apply result for generation {}",
                        intent.generation
                    );
                    self.publish(ProtectionEvent::Superseded {
                        generation: intent.generation,
                    });
                    return ReconcileOutcome::Superseded {
                        reached_platform: true,
                    };
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        "Apply attempt {}/{} failed: {} (retrying in {:?})",
                        attempt, self.retry.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return self.give_up(intent, err, attempt),
            }
        }
    }

    async fn apply(&self, enabled: bool) -> EnforcerResult<()> {
        let enforcer = Arc::clone(&self.enforcer);
        match tokio::task::spawn_blocking(move || enforcer.apply(enabled)).await {
            Ok(result) => result,
            Err(err) => Err(EnforcerError::Internal(err.to_string())),
        }
    }

    async fn already_in_effect(&self, intent: Intent) -> bool {
        let state = self.store.snapshot();
        if state.generation != intent.generation || !state.is_confirmed() {
            return false;
        }

        // A blind enforcer only echoes its own last apply
        if !self.enforcer.can_query() {
            return false;
        }

        let enforcer = Arc::clone(&self.enforcer);
        tokio::task::spawn_blocking(move || enforcer.query())
            .await
            .map(|actual| actual == intent.desired)
            .unwrap_or(false)
    }

    fn give_up(&self, intent: Intent, err: EnforcerError, attempts: u32) -> ReconcileOutcome {
        let permanent = !err.is_transient();
        let record = FailureRecord {
            generation: intent.generation,
            message: err.to_string(),
            permanent,
            attempts,
        };

        if !self.store.record_failure(record) {
            debug!(
                "Dropping failure for superseded generation {}: {}",
                intent.generation, err
            );
            self.publish(ProtectionEvent::Superseded {
                generation: intent.generation,
            });
            return ReconcileOutcome::Superseded {
                reached_platform: false,
            };
        }

        error!(
            "Capture protection degraded: {} (generation={}, attempts={}, permanent={})",
            err, intent.generation, attempts, permanent
        );
        self.publish(ProtectionEvent::Failed {
            generation: intent.generation,
            enabled: intent.desired,
            error: err.to_string(),
            permanent,
            attempts,
        });
        ReconcileOutcome::Failed
    }

    fn publish(&self, event: ProtectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
