//! fleetwatch-health: health checking for Fleetwatch.
//!
//! Probes every registered target over HTTP with a bounded timeout,
//! aggregates the outcomes into a [`Snapshot`](fleetwatch_state::Snapshot),
//! writes each status back to the registry, and appends the snapshot to
//! the history log.
//!
//! # Architecture
//!
//! ```text
//! HealthOrchestrator
//!   ├── HealthStore::list_targets()      (point-in-time registry view)
//!   ├── one task per target
//!   │   └── Probe::probe(url, timeout) → TargetOutcome
//!   ├── HealthStore::update_target_status()  (best-effort, per target)
//!   └── HealthStore::append_snapshot()
//! ```
//!
//! A probe never fails: timeouts and connection errors become `Down`
//! outcomes with a reason. Only a failed registry read (or a failed history
//! append) aborts a cycle.

pub mod checker;
pub mod error;
pub mod orchestrator;
pub mod registry;

pub use checker::{HttpProber, Probe, ProbeFuture};
pub use error::{HealthError, HealthResult};
pub use orchestrator::{CycleCallback, CycleFuture, DEFAULT_PROBE_TIMEOUT, HealthOrchestrator};
pub use registry::HealthStore;
