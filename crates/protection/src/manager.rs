//! Protection manager - the public face of capture protection
//!
//! Callers on any thread record intent through the state store and hand a
//! request to a single owner task. The owner task runs reconciliations
//! (each on its own task, with the enforcer call on the blocking pool) and
//! makes sure a stale apply that still reached the platform is repaired.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use enforcer::{EnforcerConfig, ScreenEnforcer, create_enforcer};
use protection_protocol::{LifecycleEvent, ProtectionEvent, ProtectionStatus};

use crate::{
    ProtectionConfig, ProtectionError, ProtectionResult, ProtectionState, ReconcileOutcome,
    ReconcileTrigger, Reconciler, StateStore,
};

/// Work handed to the owner task
#[derive(Debug)]
enum Request {
    /// Enforce the intent recorded for `generation`
    Assert { generation: u64 },
    Lifecycle(LifecycleEvent),
    Reconcile,
    Shutdown,
}

/// Thread-safe handle for OS lifecycle callbacks
///
/// `notify` never blocks, so it is safe to call from UI-adjacent threads.
#[derive(Debug, Clone)]
pub struct LifecycleNotifier {
    requests: mpsc::UnboundedSender<Request>,
}

impl LifecycleNotifier {
    pub fn notify(&self, event: LifecycleEvent) -> ProtectionResult<()> {
        self.requests
            .send(Request::Lifecycle(event))
            .map_err(|_| ProtectionError::Stopped)
    }
}

/// Screen capture protection manager
pub struct ProtectionManager {
    store: Arc<StateStore>,
    enforcer: Arc<dyn ScreenEnforcer>,
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<ProtectionEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProtectionManager {
    /// Start a manager on the current tokio runtime
    pub fn new(
        enforcer: Arc<dyn ScreenEnforcer>,
        config: ProtectionConfig,
    ) -> ProtectionResult<Self> {
        let handle = Handle::try_current().map_err(|_| ProtectionError::NoRuntime)?;
        Self::start_on(&handle, enforcer, config)
    }

    /// Start a manager backed by this platform's native enforcer
    pub fn with_native_enforcer(
        enforcer_config: &EnforcerConfig,
        config: ProtectionConfig,
    ) -> ProtectionResult<Self> {
        let enforcer: Arc<dyn ScreenEnforcer> = Arc::from(create_enforcer(enforcer_config)?);
        Self::new(enforcer, config)
    }

    /// Start a manager whose owner task runs on `handle`
    pub fn start_on(
        handle: &Handle,
        enforcer: Arc<dyn ScreenEnforcer>,
        config: ProtectionConfig,
    ) -> ProtectionResult<Self> {
        config.validate()?;

        let store = Arc::new(StateStore::new(config.default_enabled));
        let (events, _) = broadcast::channel(config.event_capacity);
        let (requests, rx) = mpsc::unbounded_channel();

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            enforcer.clone(),
            config.retry.clone(),
            events.clone(),
        ));

        if config.assert_on_start {
            let _ = requests.send(Request::Assert {
                generation: store.generation(),
            });
        }

        let owner = Owner {
            store: store.clone(),
            reconciler,
            requests: rx,
            events: events.clone(),
            interval: config.reconcile_interval,
            tasks: JoinSet::new(),
            in_flight: None,
            rerun: None,
        };
        let task = handle.spawn(owner.run());

        info!(
            "Protection manager started: platform={}, native={}, default_enabled={}",
            enforcer.platform(),
            enforcer.is_native(),
            config.default_enabled
        );

        Ok(Self {
            store,
            enforcer,
            requests,
            events,
            task: Mutex::new(Some(task)),
        })
    }

    /// Request capture protection. Never fails; outcome shows up in `status()`.
    pub fn enable(&self) {
        self.request(true);
    }

    /// Request capture to be allowed again
    pub fn disable(&self) {
        self.request(false);
    }

    fn request(&self, enabled: bool) {
        let generation = self.store.set_desired(enabled);
        info!(
            "Capture protection {} requested (generation={})",
            if enabled { "enable" } else { "disable" },
            generation
        );

        if self.requests.send(Request::Assert { generation }).is_err() {
            warn!("Protection manager stopped; intent recorded without enforcement");
        }
    }

    /// Cached status; does not query the platform
    pub fn status(&self) -> ProtectionStatus {
        self.store.status()
    }

    /// Protection is requested and confirmed
    pub fn is_enabled(&self) -> bool {
        self.status().is_protected()
    }

    pub fn snapshot(&self) -> ProtectionState {
        self.store.snapshot()
    }

    pub fn notify_lifecycle(&self, event: LifecycleEvent) -> ProtectionResult<()> {
        self.requests
            .send(Request::Lifecycle(event))
            .map_err(|_| ProtectionError::Stopped)
    }

    pub fn lifecycle_notifier(&self) -> LifecycleNotifier {
        LifecycleNotifier {
            requests: self.requests.clone(),
        }
    }

    /// Re-assert the current intent now
    pub fn reconcile(&self) -> ProtectionResult<()> {
        self.requests
            .send(Request::Reconcile)
            .map_err(|_| ProtectionError::Stopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtectionEvent> {
        self.events.subscribe()
    }

    pub fn enforcer(&self) -> &Arc<dyn ScreenEnforcer> {
        &self.enforcer
    }

    /// Stop the owner task and wait for it to exit
    pub async fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!("Protection owner task failed: {}", err);
            }
        }
    }
}

/// Owner task state
struct Owner {
    store: Arc<StateStore>,
    reconciler: Arc<Reconciler>,
    requests: mpsc::UnboundedReceiver<Request>,
    events: broadcast::Sender<ProtectionEvent>,
    interval: Option<Duration>,
    tasks: JoinSet<(u64, ReconcileOutcome)>,
    /// Generation with a reconciliation running
    in_flight: Option<u64>,
    /// Trigger deferred until the in-flight reconciliation finishes
    rerun: Option<ReconcileTrigger>,
}

impl Owner {
    async fn run(mut self) {
        let mut ticker = self.interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle(request),
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.complete(joined);
                }
                _ = tick(&mut ticker) => self.dispatch(ReconcileTrigger::Periodic),
            }
        }

        self.tasks.abort_all();
        debug!("Protection owner task stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Assert { generation } => {
                if generation == self.store.generation() {
                    self.dispatch(ReconcileTrigger::Request);
                } else {
                    debug!("Skipping superseded request for generation {}", generation);
                }
            }
            Request::Lifecycle(event) => {
                debug!("Lifecycle event: {}", event);
                let _ = self.events.send(ProtectionEvent::Lifecycle { event });
                if let Some(trigger) = ReconcileTrigger::for_lifecycle(event) {
                    self.dispatch(trigger);
                }
            }
            Request::Reconcile => self.dispatch(ReconcileTrigger::Manual),
            Request::Shutdown => {}
        }
    }

    fn dispatch(&mut self, trigger: ReconcileTrigger) {
        let intent = self.store.intent();

        if self.in_flight == Some(intent.generation) {
            debug!(
                "Reconciliation for generation {} in flight; deferring {:?}",
                intent.generation, trigger
            );
            // A periodic tick never displaces a pending lifecycle/manual/repair trigger
            if trigger != ReconcileTrigger::Periodic || self.rerun.is_none() {
                self.rerun = Some(trigger);
            }
            return;
        }

        self.in_flight = Some(intent.generation);
        let reconciler = Arc::clone(&self.reconciler);
        self.tasks.spawn(async move {
            let outcome = reconciler.reconcile(intent, trigger).await;
            (intent.generation, outcome)
        });
    }

    fn complete(&mut self, joined: Result<(u64, ReconcileOutcome), JoinError>) {
        let (generation, outcome) = match joined {
            Ok(result) => result,
            Err(err) => {
                error!("Reconciliation task failed: {}", err);
                self.in_flight = None;
                self.drain_rerun();
                return;
            }
        };

        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }

        if outcome == (ReconcileOutcome::Superseded { reached_platform: true }) {
            debug!(
                "Stale apply for generation {} reached the platform; re-asserting",
                generation
            );
            self.dispatch(ReconcileTrigger::Repair);
            return;
        }

        self.drain_rerun();
    }

    fn drain_rerun(&mut self) {
        if self.in_flight.is_none() {
            if let Some(trigger) = self.rerun.take() {
                self.dispatch(trigger);
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryPolicy;
    use crossbeam_channel::{Receiver, Sender, bounded};
    use enforcer::{EnforcerError, EnforcerResult, SimulatedEnforcer};
    use protection_protocol::ProtectionPhase;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    fn test_config() -> ProtectionConfig {
        ProtectionConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn started(enforcer: Arc<SimulatedEnforcer>) -> ProtectionManager {
        let manager = ProtectionManager::new(enforcer, test_config()).unwrap();
        wait_until(|| manager.status().confirmed).await;
        manager
    }

    fn idle_owner(enforcer: Arc<dyn ScreenEnforcer>) -> (Owner, mpsc::UnboundedSender<Request>) {
        let store = Arc::new(StateStore::new(false));
        let (events, _) = broadcast::channel(16);
        let (requests, rx) = mpsc::unbounded_channel();
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            enforcer,
            test_config().retry,
            events.clone(),
        ));
        let owner = Owner {
            store,
            reconciler,
            requests: rx,
            events,
            interval: None,
            tasks: JoinSet::new(),
            in_flight: None,
            rerun: None,
        };
        (owner, requests)
    }

    /// Stalls every `apply(true)` until the test releases it
    struct GatedEnforcer {
        gate: Receiver<()>,
        entered: AtomicU64,
        os_state: AtomicBool,
    }

    impl GatedEnforcer {
        fn new() -> (Arc<Self>, Sender<()>) {
            let (tx, rx) = bounded(4);
            let enforcer = Arc::new(Self {
                gate: rx,
                entered: AtomicU64::new(0),
                os_state: AtomicBool::new(false),
            });
            (enforcer, tx)
        }
    }

    impl ScreenEnforcer for GatedEnforcer {
        fn platform(&self) -> &'static str {
            "test"
        }

        fn apply(&self, enabled: bool) -> EnforcerResult<()> {
            if enabled {
                self.entered.fetch_add(1, Ordering::SeqCst);
                let _ = self.gate.recv_timeout(Duration::from_secs(5));
            }
            self.os_state.store(enabled, Ordering::SeqCst);
            Ok(())
        }

        fn query(&self) -> bool {
            self.os_state.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_requires_runtime() {
        let result = ProtectionManager::new(Arc::new(SimulatedEnforcer::new()), test_config());
        assert!(matches!(result, Err(ProtectionError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_cold_start_asserts_default() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let config = ProtectionConfig {
            default_enabled: true,
            ..test_config()
        };
        let manager = ProtectionManager::new(enforcer.clone(), config).unwrap();

        wait_until(|| manager.is_enabled()).await;
        assert!(enforcer.query());
        assert_eq!(manager.status().generation, 0);
        assert!(manager.snapshot().last_applied_at.is_some());
    }

    #[tokio::test]
    async fn test_enable_confirms() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;

        manager.enable();
        let status = manager.status();
        assert!(status.desired);
        assert!(status.generation >= 1);

        wait_until(|| manager.status().confirmed).await;
        assert_eq!(manager.status().phase, ProtectionPhase::Enabled);
        assert!(manager.is_enabled());
        assert!(enforcer.query());

        manager.disable();
        wait_until(|| manager.status().confirmed).await;
        assert_eq!(manager.status().phase, ProtectionPhase::Disabled);
        assert!(!enforcer.query());
    }

    #[tokio::test]
    async fn test_desired_follows_last_call() {
        let enforcer = Arc::new(SimulatedEnforcer::new().with_latency(Duration::from_millis(2)));
        let manager = started(enforcer.clone()).await;

        let calls = [true, false, true, true, false, true, false, false, true];
        for &enabled in &calls {
            if enabled {
                manager.enable();
            } else {
                manager.disable();
            }
            assert_eq!(manager.status().desired, enabled);
        }

        assert_eq!(manager.status().generation, calls.len() as u64);
        wait_until(|| manager.status().confirmed).await;
        assert!(manager.status().desired);
        wait_until(|| enforcer.query()).await;
    }

    #[tokio::test]
    async fn test_enable_twice_is_idempotent() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;

        manager.enable();
        manager.enable();
        wait_until(|| manager.status().confirmed).await;

        let status = manager.status();
        assert!(status.desired);
        assert!(!status.degraded);
        assert_eq!(status.phase, ProtectionPhase::Enabled);
        assert!(enforcer.query());
    }

    #[tokio::test]
    async fn test_stale_completion_does_not_reflip() {
        let (enforcer, release) = GatedEnforcer::new();
        let manager = ProtectionManager::new(enforcer.clone(), test_config()).unwrap();
        wait_until(|| manager.status().confirmed).await;
        let mut events = manager.subscribe();

        manager.enable();
        let stalled = manager.status().generation;
        wait_until(|| enforcer.entered.load(Ordering::SeqCst) == 1).await;

        manager.disable();
        wait_until(|| manager.status().confirmed).await;
        assert!(!manager.status().desired);

        release.send(()).unwrap();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event == (ProtectionEvent::Superseded { generation: stalled }) {
                break;
            }
        }

        // The late apply(true) hit the platform; the owner repairs it
        wait_until(|| !enforcer.query()).await;
        wait_until(|| manager.status().confirmed).await;
        let status = manager.status();
        assert!(!status.desired);
        assert_eq!(status.phase, ProtectionPhase::Disabled);
        assert_eq!(manager.snapshot().last_applied, Some(false));
    }

    #[tokio::test]
    async fn test_permanent_failure_degrades_until_reconciled() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        enforcer.fail_always(EnforcerError::PermissionDenied("entitlement missing".into()));

        manager.enable();
        wait_until(|| manager.status().degraded).await;
        assert_eq!(enforcer.apply_calls(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = manager.status();
        assert!(status.desired);
        assert!(status.degraded);
        assert!(!status.confirmed);
        assert_eq!(status.phase, ProtectionPhase::Degraded);
        assert!(!manager.is_enabled());

        enforcer.clear_failures();
        manager.reconcile().unwrap();
        wait_until(|| manager.status().confirmed).await;
        assert!(!manager.status().degraded);
        assert_eq!(manager.status().phase, ProtectionPhase::Enabled);
    }

    #[tokio::test]
    async fn test_new_intent_clears_degraded() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        enforcer.fail_always(EnforcerError::Unsupported("build 17763".into()));

        manager.enable();
        wait_until(|| manager.status().degraded).await;

        manager.disable();
        assert!(!manager.status().degraded);
    }

    #[tokio::test]
    async fn test_foreground_after_failure_reasserts() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        enforcer.fail_always(EnforcerError::Busy("compositor".into()));

        manager.enable();
        wait_until(|| manager.status().degraded).await;
        assert!(!enforcer.query());

        enforcer.clear_failures();
        manager
            .notify_lifecycle(LifecycleEvent::ForegroundEntered)
            .unwrap();
        wait_until(|| manager.status().confirmed).await;
        assert!(manager.is_enabled());
        assert!(enforcer.query());
    }

    #[tokio::test]
    async fn test_background_does_not_apply() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        manager.enable();
        wait_until(|| manager.status().confirmed).await;
        let before = enforcer.apply_calls();
        let mut events = manager.subscribe();

        manager
            .notify_lifecycle(LifecycleEvent::BackgroundEntered)
            .unwrap();
        manager
            .notify_lifecycle(LifecycleEvent::ForegroundEntered)
            .unwrap();

        wait_until(|| enforcer.apply_calls() == before + 1).await;
        assert_eq!(
            events.recv().await.unwrap(),
            ProtectionEvent::Lifecycle {
                event: LifecycleEvent::BackgroundEntered
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ProtectionEvent::Lifecycle {
                event: LifecycleEvent::ForegroundEntered
            }
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(enforcer.apply_calls(), before + 1);
    }

    #[tokio::test]
    async fn test_display_change_from_callback_thread() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        manager.enable();
        wait_until(|| manager.status().confirmed).await;

        enforcer.simulate_os_reset(false);
        let notifier = manager.lifecycle_notifier();
        std::thread::spawn(move || {
            notifier
                .notify(LifecycleEvent::DisplayConfigurationChanged)
                .unwrap();
        })
        .join()
        .unwrap();

        wait_until(|| enforcer.query()).await;
        assert!(manager.is_enabled());
    }

    #[tokio::test]
    async fn test_periodic_verification_repairs_drift() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let config = ProtectionConfig {
            reconcile_interval: Some(Duration::from_millis(10)),
            ..test_config()
        };
        let manager = ProtectionManager::new(enforcer.clone(), config).unwrap();
        manager.enable();
        wait_until(|| manager.is_enabled()).await;

        enforcer.simulate_os_reset(false);
        wait_until(|| enforcer.query()).await;
        assert!(manager.is_enabled());
    }

    #[tokio::test]
    async fn test_intent_survives_shutdown() {
        let enforcer = Arc::new(SimulatedEnforcer::new());
        let manager = started(enforcer.clone()).await;
        manager.shutdown().await;

        manager.enable();
        let status = manager.status();
        assert!(status.desired);
        assert!(!status.confirmed);
        assert!(matches!(manager.reconcile(), Err(ProtectionError::Stopped)));
        assert!(matches!(
            manager.notify_lifecycle(LifecycleEvent::ForegroundEntered),
            Err(ProtectionError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_periodic_tick_keeps_deferred_lifecycle_trigger() {
        let (mut owner, _requests) = idle_owner(Arc::new(SimulatedEnforcer::new()));
        owner.in_flight = Some(owner.store.generation());

        owner.dispatch(ReconcileTrigger::Lifecycle(LifecycleEvent::ForegroundEntered));
        owner.dispatch(ReconcileTrigger::Periodic);
        assert_eq!(
            owner.rerun,
            Some(ReconcileTrigger::Lifecycle(LifecycleEvent::ForegroundEntered))
        );
        assert!(owner.tasks.is_empty());

        owner.rerun = None;
        owner.dispatch(ReconcileTrigger::Periodic);
        assert_eq!(owner.rerun, Some(ReconcileTrigger::Periodic));

        owner.dispatch(ReconcileTrigger::Manual);
        assert_eq!(owner.rerun, Some(ReconcileTrigger::Manual));
    }

    #[tokio::test]
    async fn test_failed_task_runs_deferred_trigger() {
        let (mut owner, _requests) = idle_owner(Arc::new(SimulatedEnforcer::new()));
        let generation = owner.store.generation();
        owner.in_flight = Some(generation);
        owner.rerun = Some(ReconcileTrigger::Manual);

        let join_error = tokio::spawn(async { panic!("reconcile task died") })
            .await
            .unwrap_err();
        owner.complete(Err(join_error));

        assert_eq!(owner.rerun, None);
        assert_eq!(owner.in_flight, Some(generation));
        assert_eq!(owner.tasks.len(), 1);

        let (joined_generation, outcome) = owner.tasks.join_next().await.unwrap().unwrap();
        assert_eq!(joined_generation, generation);
        assert_eq!(outcome, ReconcileOutcome::Applied);
    }

    /// Reports its own last apply instead of reading the OS
    struct BlindEnforcer {
        last_applied: AtomicBool,
        os_state: AtomicBool,
        applies: AtomicU64,
    }

    impl ScreenEnforcer for BlindEnforcer {
        fn platform(&self) -> &'static str {
            "test"
        }

        fn apply(&self, enabled: bool) -> EnforcerResult<()> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            self.last_applied.store(enabled, Ordering::SeqCst);
            self.os_state.store(enabled, Ordering::SeqCst);
            Ok(())
        }

        fn query(&self) -> bool {
            self.last_applied.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_periodic_reasserts_when_enforcer_cannot_query() {
        let enforcer = Arc::new(BlindEnforcer {
            last_applied: AtomicBool::new(false),
            os_state: AtomicBool::new(false),
            applies: AtomicU64::new(0),
        });
        let config = ProtectionConfig {
            reconcile_interval: Some(Duration::from_millis(10)),
            ..test_config()
        };
        let manager = ProtectionManager::new(enforcer.clone(), config).unwrap();
        manager.enable();
        wait_until(|| manager.is_enabled()).await;

        enforcer.os_state.store(false, Ordering::SeqCst);
        let applies = enforcer.applies.load(Ordering::SeqCst);
        wait_until(|| enforcer.applies.load(Ordering::SeqCst) > applies).await;
        wait_until(|| enforcer.os_state.load(Ordering::SeqCst)).await;
        assert!(manager.is_enabled());
        manager.shutdown().await;
    }
}
