//! Deployment tracker: drives the deployment state machine.
//!
//! ```text
//! start(version) ──► in_progress ──(delay elapses)──► success
//! ```
//!
//! Every `start` persists a record and schedules its own completion task.
//! Completion tasks are independent: overlapping deployments each finish on
//! their own timer. No API call cancels a completion; only `shutdown` does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fleetwatch_state::{DeploymentId, DeploymentRecord, StateError, StateStore};

use crate::pipeline::PipelineStatus;

/// Time a simulated deployment spends in progress.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(2000);

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid deployment request: {0}")]
    Validation(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// A scheduled completion and the signal that cancels it.
struct CompletionSlot {
    handle: JoinHandle<()>,
    cancel_tx: watch::Sender<bool>,
}

/// Records deployments and owns the pipeline status.
#[derive(Clone)]
pub struct DeploymentTracker {
    state: StateStore,
    pipeline: Arc<watch::Sender<PipelineStatus>>,
    /// Pending completions: deployment id → slot.
    completions: Arc<Mutex<HashMap<DeploymentId, CompletionSlot>>>,
    delay: Duration,
}

impl DeploymentTracker {
    /// Create a tracker with the default completion delay.
    pub fn new(state: StateStore) -> Self {
        Self::with_delay(state, DEFAULT_COMPLETION_DELAY)
    }

    /// Create a tracker with a custom completion delay.
    pub fn with_delay(state: StateStore, delay: Duration) -> Self {
        let (pipeline, _) = watch::channel(PipelineStatus::default());
        Self {
            state,
            pipeline: Arc::new(pipeline),
            completions: Arc::new(Mutex::new(HashMap::new())),
            delay,
        }
    }

    /// Start a deployment of `version`.
    ///
    /// Returns the `in_progress` record immediately; the transition to
    /// `success` happens in the background after the configured delay.
    pub async fn start(&self, version: &str) -> TrackerResult<DeploymentRecord> {
        let version = version.trim();
        if version.is_empty() {
            return Err(TrackerError::Validation("version is required".to_string()));
        }

        let record = self.state.create_deployment(version, epoch_millis())?;
        self.pipeline.send_replace(PipelineStatus::InProgress);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        // Hold the lock across spawn so the task cannot clear its slot before
        // the slot exists.
        let mut completions = self.completions.lock().await;
        let tracker = self.clone();
        let id = record.id;
        let handle = tokio::spawn(async move {
            tracker.await_completion(id, cancel_rx).await;
        });
        completions.insert(id, CompletionSlot { handle, cancel_tx });
        drop(completions);

        info!(
            id = record.id,
            version = %record.version,
            delay_ms = self.delay.as_millis() as u64,
            "deployment started"
        );
        Ok(record)
    }

    /// Every recorded deployment in creation order.
    pub fn history(&self) -> TrackerResult<Vec<DeploymentRecord>> {
        Ok(self.state.list_deployments()?)
    }

    /// Current pipeline status.
    pub fn pipeline_status(&self) -> PipelineStatus {
        *self.pipeline.borrow()
    }

    /// Number of deployments still waiting for completion.
    pub async fn pending(&self) -> usize {
        self.completions.lock().await.len()
    }

    /// Cancel all pending completions (for graceful shutdown).
    ///
    /// Cancelled deployments stay `in_progress` in the store.
    pub async fn shutdown(&self) {
        let slots: Vec<(DeploymentId, CompletionSlot)> =
            self.completions.lock().await.drain().collect();
        for (id, slot) in slots {
            let _ = slot.cancel_tx.send(true);
            let _ = slot.handle.await;
            debug!(id, "deployment completion cancelled");
        }
        info!("deployment tracker stopped");
    }

    async fn await_completion(&self, id: DeploymentId, mut cancel: watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {
                self.complete(id);
            }
            _ = cancel.changed() => {
                debug!(id, "completion task cancelled");
            }
        }
        self.completions.lock().await.remove(&id);
    }

    /// Apply the `in_progress → success` transition. Failures are contained.
    fn complete(&self, id: DeploymentId) {
        match self.state.complete_deployment(id, epoch_millis()) {
            Ok(record) => {
                info!(id, version = %record.version, "deployment succeeded");
            }
            Err(e) => {
                warn!(id, error = %e, "failed to persist deployment completion");
            }
        }
        self.pipeline.send_replace(PipelineStatus::Success);
    }
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
