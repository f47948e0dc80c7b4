//! Health orchestrator: runs check cycles over the whole target registry.
//!
//! Each cycle reads the registry once, spawns one probe task per target,
//! joins them, writes statuses back, and logs the resulting snapshot. The
//! orchestrator can also run cycles periodically in the background.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fleetwatch_state::*;

use crate::checker::{HttpProber, Probe, normalize, timeout_reason};
use crate::error::{HealthError, HealthResult};
use crate::registry::HealthStore;

/// Per-target probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Callback invoked with each snapshot produced by the periodic loop.
pub type CycleCallback = Arc<dyn Fn(Snapshot) -> CycleFuture + Send + Sync>;

pub type CycleFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Drives health-check cycles against a [`HealthStore`].
#[derive(Clone)]
pub struct HealthOrchestrator {
    state: Arc<dyn HealthStore>,
    prober: Arc<dyn Probe>,
    probe_timeout: Duration,
    on_cycle: Option<CycleCallback>,
}

impl HealthOrchestrator {
    /// Create an orchestrator that probes over HTTP.
    pub fn new(state: impl HealthStore) -> reqwest::Result<Self> {
        Ok(Self::with_prober(state, Arc::new(HttpProber::new()?)))
    }

    /// Create an orchestrator with a custom probe implementation.
    pub fn with_prober(state: impl HealthStore, prober: Arc<dyn Probe>) -> Self {
        Self {
            state: Arc::new(state),
            prober,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            on_cycle: None,
        }
    }

    /// Set a callback for snapshots from the periodic loop.
    pub fn with_callback(mut self, callback: CycleCallback) -> Self {
        self.on_cycle = Some(callback);
        self
    }

    /// Override the per-target timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Run one health-check cycle and return its snapshot.
    ///
    /// The snapshot covers exactly the targets registered when the cycle
    /// started. Probe failures become `Down` outcomes and status write
    /// failures are logged; neither aborts the cycle.
    pub async fn run_cycle(&self) -> HealthResult<Snapshot> {
        let targets = self.state.list_targets().map_err(|e| {
            error!(error = %e, "health cycle aborted, registry unreadable");
            HealthError::Registry(e)
        })?;
        let started = Instant::now();

        let mut pending = Vec::with_capacity(targets.len());
        for Target { name, url, .. } in targets {
            let prober = Arc::clone(&self.prober);
            let timeout = self.probe_timeout;
            let handle = tokio::spawn(async move {
                bounded_probe(prober.as_ref(), &url, timeout).await
            });
            pending.push((name, handle));
        }

        // All tasks are already running; joining in order only waits on the slowest.
        let mut statuses = BTreeMap::new();
        for (name, handle) in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(target_name = %name, error = %e, "probe task failed");
                    TargetOutcome::down(format!("probe task failed: {e}"))
                }
            };
            statuses.insert(name, outcome);
        }

        let timestamp = epoch_millis();
        for (name, outcome) in &statuses {
            match self
                .state
                .update_target_status(name, outcome.status, timestamp)
            {
                Ok(true) => {}
                Ok(false) => debug!(target_name = %name, "target removed during cycle"),
                Err(e) => warn!(target_name = %name, error = %e, "failed to persist target status"),
            }
        }

        let snapshot = Snapshot {
            timestamp,
            statuses,
        };
        self.state.append_snapshot(&snapshot).map_err(|e| {
            error!(error = %e, "failed to append snapshot");
            HealthError::History(e)
        })?;

        info!(
            targets = snapshot.statuses.len(),
            up = snapshot.up_count(),
            down = snapshot.down_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "health cycle completed"
        );
        Ok(snapshot)
    }

    /// Probe a single URL without touching the registry or history.
    pub async fn check_url(&self, url: &str) -> TargetOutcome {
        bounded_probe(self.prober.as_ref(), url, self.probe_timeout).await
    }

    /// The most recently logged snapshot, without probing.
    pub fn latest(&self) -> HealthResult<Option<Snapshot>> {
        self.state.latest_snapshot().map_err(HealthError::History)
    }

    /// Every logged snapshot in append order.
    pub fn history(&self) -> HealthResult<Vec<Snapshot>> {
        self.state.list_snapshots().map_err(HealthError::History)
    }

    /// Run cycles every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "periodic health checks started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_cycle().await {
                        Ok(snapshot) => {
                            if let Some(ref cb) = self.on_cycle {
                                cb(snapshot).await;
                            }
                        }
                        Err(e) => error!(error = %e, "periodic health cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("periodic health checks shutting down");
                    break;
                }
            }
        }
    }
}

/// Probe with an outer deadline so a misbehaving prober cannot stall a cycle.
async fn bounded_probe(prober: &dyn Probe, url: &str, timeout: Duration) -> TargetOutcome {
    match tokio::time::timeout(timeout, prober.probe(url, timeout)).await {
        Ok(outcome) => normalize(outcome),
        Err(_) => {
            debug!(%url, "probe exceeded deadline");
            TargetOutcome::down(timeout_reason(timeout))
        }
    }
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    use crate::checker::ProbeFuture;

    /// Resolves each URL from a fixed table; unknown URLs are `Up`.
    /// URLs starting with `hang://` never resolve.
    #[derive(Default)]
    struct StubProber {
        outcomes: HashMap<String, TargetOutcome>,
    }

    impl StubProber {
        fn with(mut self, url: &str, outcome: TargetOutcome) -> Self {
            self.outcomes.insert(url.to_string(), outcome);
            self
        }
    }

    impl Probe for StubProber {
        fn probe<'a>(&'a self, url: &'a str, _timeout: Duration) -> ProbeFuture<'a> {
            Box::pin(async move {
                if url.starts_with("hang://") {
                    std::future::pending::<()>().await;
                }
                if url.starts_with("panic://") {
                    panic!("prober blew up");
                }
                self.outcomes
                    .get(url)
                    .cloned()
                    .unwrap_or_else(TargetOutcome::up)
            })
        }
    }

    fn orchestrator(store: &StateStore, prober: StubProber) -> HealthOrchestrator {
        HealthOrchestrator::with_prober(store.clone(), Arc::new(prober))
            .with_probe_timeout(Duration::from_millis(300))
    }

    fn register(store: &StateStore, name: &str, url: &str) {
        store.add_target(&Target::new(name, url, 1)).unwrap();
    }

    /// Which store calls fail.
    #[derive(Clone, Copy, Default)]
    struct Faults {
        list: bool,
        update: bool,
        append: bool,
    }

    /// Delegates to a real store, failing the calls selected in `Faults`.
    struct FaultyStore {
        inner: StateStore,
        faults: Faults,
    }

    impl HealthStore for FaultyStore {
        fn list_targets(&self) -> StateResult<Vec<Target>> {
            if self.faults.list {
                return Err(StateError::Read("registry unavailable".to_string()));
            }
            self.inner.list_targets()
        }

        fn update_target_status(
            &self,
            name: &str,
            status: TargetStatus,
            checked_at: u64,
        ) -> StateResult<bool> {
            if self.faults.update {
                return Err(StateError::Write("disk full".to_string()));
            }
            self.inner.update_target_status(name, status, checked_at)
        }

        fn append_snapshot(&self, snapshot: &Snapshot) -> StateResult<u64> {
            if self.faults.append {
                return Err(StateError::Write("disk full".to_string()));
            }
            self.inner.append_snapshot(snapshot)
        }

        fn list_snapshots(&self) -> StateResult<Vec<Snapshot>> {
            self.inner.list_snapshots()
        }

        fn latest_snapshot(&self) -> StateResult<Option<Snapshot>> {
            self.inner.latest_snapshot()
        }
    }

    fn faulty_orchestrator(store: &StateStore, faults: Faults) -> HealthOrchestrator {
        let faulty = FaultyStore {
            inner: store.clone(),
            faults,
        };
        HealthOrchestrator::with_prober(faulty, Arc::new(StubProber::default()))
            .with_probe_timeout(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn cycle_covers_exactly_registered_targets() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        register(&store, "b", "http://b");
        register(&store, "c", "http://c");

        let snapshot = orchestrator(&store, StubProber::default())
            .run_cycle()
            .await
            .unwrap();

        let keys: BTreeSet<&str> = snapshot.statuses.keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(["a", "b", "c"]));
    }

    #[tokio::test]
    async fn cycle_with_empty_registry_logs_empty_snapshot() {
        let store = StateStore::open_in_memory().unwrap();

        let snapshot = orchestrator(&store, StubProber::default())
            .run_cycle()
            .await
            .unwrap();

        assert!(snapshot.statuses.is_empty());
        assert_eq!(store.list_snapshots().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cycle_writes_statuses_back_to_registry() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "up", "http://up");
        register(&store, "down", "http://down");
        let prober = StubProber::default().with("http://down", TargetOutcome::down("Bad Gateway"));

        let snapshot = orchestrator(&store, prober).run_cycle().await.unwrap();

        assert_eq!(snapshot.statuses["down"], TargetOutcome::down("Bad Gateway"));
        assert_eq!(
            store.get_target("up").unwrap().unwrap().status,
            TargetStatus::Up
        );
        let down = store.get_target("down").unwrap().unwrap();
        assert_eq!(down.status, TargetStatus::Down);
        assert_eq!(down.checked_at, Some(snapshot.timestamp));
    }

    #[tokio::test]
    async fn unreadable_registry_aborts_without_logging() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        let faults = Faults {
            list: true,
            ..Faults::default()
        };

        let err = faulty_orchestrator(&store, faults)
            .run_cycle()
            .await
            .unwrap_err();

        assert!(matches!(err, HealthError::Registry(_)));
        assert!(store.list_snapshots().unwrap().is_empty());
        assert_eq!(
            store.get_target("a").unwrap().unwrap().status,
            TargetStatus::Unknown
        );
    }

    #[tokio::test]
    async fn failed_status_writes_do_not_abort_cycle() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        register(&store, "b", "http://b");
        let faults = Faults {
            update: true,
            ..Faults::default()
        };

        let snapshot = faulty_orchestrator(&store, faults)
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(snapshot.statuses.len(), 2);
        assert_eq!(store.list_snapshots().unwrap(), vec![snapshot]);
        // Registry keeps its previous status.
        let a = store.get_target("a").unwrap().unwrap();
        assert_eq!(a.status, TargetStatus::Unknown);
        assert_eq!(a.checked_at, None);
    }

    #[tokio::test]
    async fn failed_append_surfaces_history_error() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        let faults = Faults {
            append: true,
            ..Faults::default()
        };

        let err = faulty_orchestrator(&store, faults)
            .run_cycle()
            .await
            .unwrap_err();

        assert!(matches!(err, HealthError::History(_)));
        assert!(store.list_snapshots().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cycle_appends_to_history_in_order() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        let orch = orchestrator(&store, StubProber::default());

        let first = orch.run_cycle().await.unwrap();
        let second = orch.run_cycle().await.unwrap();

        let history = orch.history().unwrap();
        assert_eq!(history, vec![first, second.clone()]);
        assert_eq!(orch.latest().unwrap(), Some(second));
    }

    #[tokio::test]
    async fn removed_target_is_absent_from_next_cycle() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "keep", "http://keep");
        register(&store, "drop", "http://drop");
        let orch = orchestrator(&store, StubProber::default());

        assert_eq!(orch.run_cycle().await.unwrap().statuses.len(), 2);

        store.remove_target("drop").unwrap();
        let snapshot = orch.run_cycle().await.unwrap();
        assert!(!snapshot.statuses.contains_key("drop"));
        assert!(snapshot.statuses.contains_key("keep"));
    }

    #[tokio::test]
    async fn hanging_target_does_not_serialize_the_cycle() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "fast", "http://fast");
        register(&store, "hung-1", "hang://one");
        register(&store, "hung-2", "hang://two");
        let orch = orchestrator(&store, StubProber::default());
        let timeout = orch.probe_timeout();

        let started = Instant::now();
        let snapshot = orch.run_cycle().await.unwrap();
        let elapsed = started.elapsed();

        // Bounded by one timeout plus overhead, not by the sum.
        assert!(elapsed < timeout * 2, "cycle took {elapsed:?}");
        assert_eq!(snapshot.statuses["fast"], TargetOutcome::up());
        assert_eq!(
            snapshot.statuses["hung-1"],
            TargetOutcome::down(timeout_reason(timeout))
        );
        assert_eq!(snapshot.statuses["hung-2"].status, TargetStatus::Down);
    }

    #[tokio::test]
    async fn panicking_probe_is_contained() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "ok", "http://ok");
        register(&store, "boom", "panic://boom");

        let snapshot = orchestrator(&store, StubProber::default())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(snapshot.statuses.len(), 2);
        assert_eq!(snapshot.statuses["boom"].status, TargetStatus::Down);
        assert!(snapshot.statuses["boom"].reason.is_some());
    }

    #[tokio::test]
    async fn down_without_reason_is_normalized() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "x", "http://x");
        let prober = StubProber::default().with(
            "http://x",
            TargetOutcome {
                status: TargetStatus::Down,
                reason: None,
            },
        );

        let snapshot = orchestrator(&store, prober).run_cycle().await.unwrap();
        assert_eq!(
            snapshot.statuses["x"],
            TargetOutcome::down(crate::checker::UNKNOWN_ERROR)
        );
    }

    #[tokio::test]
    async fn check_url_leaves_stores_untouched() {
        let store = StateStore::open_in_memory().unwrap();
        let prober = StubProber::default().with("http://adhoc", TargetOutcome::down("Not Found"));
        let orch = orchestrator(&store, prober);

        let outcome = orch.check_url("http://adhoc").await;

        assert_eq!(outcome, TargetOutcome::down("Not Found"));
        assert!(store.list_snapshots().unwrap().is_empty());
        assert!(store.list_targets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn periodic_loop_runs_and_stops() {
        let store = StateStore::open_in_memory().unwrap();
        register(&store, "a", "http://a");
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let callback: CycleCallback = Arc::new(move |snapshot: Snapshot| -> CycleFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                assert!(snapshot.statuses.contains_key("a"));
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
        });
        let orch = orchestrator(&store, StubProber::default()).with_callback(callback);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = orch.clone();
        let handle = tokio::spawn(async move {
            runner.run(Duration::from_millis(20), shutdown_rx).await;
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let logged = store.list_snapshots().unwrap().len();
        assert!(logged > 0);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), logged);
    }
}
