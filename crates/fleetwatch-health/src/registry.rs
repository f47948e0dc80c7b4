//! Storage the orchestrator reads targets from and logs snapshots to.

use fleetwatch_state::{Snapshot, StateResult, StateStore, Target, TargetStatus};

/// Registry and history operations used by a health cycle.
///
/// Implemented for [`StateStore`]; tests substitute stores that fail on
/// demand.
pub trait HealthStore: Send + Sync + 'static {
    fn list_targets(&self) -> StateResult<Vec<Target>>;

    /// Returns `false` when the target no longer exists.
    fn update_target_status(
        &self,
        name: &str,
        status: TargetStatus,
        checked_at: u64,
    ) -> StateResult<bool>;

    fn append_snapshot(&self, snapshot: &Snapshot) -> StateResult<u64>;

    fn list_snapshots(&self) -> StateResult<Vec<Snapshot>>;

    fn latest_snapshot(&self) -> StateResult<Option<Snapshot>>;
}

impl HealthStore for StateStore {
    fn list_targets(&self) -> StateResult<Vec<Target>> {
        StateStore::list_targets(self)
    }

    fn update_target_status(
        &self,
        name: &str,
        status: TargetStatus,
        checked_at: u64,
    ) -> StateResult<bool> {
        StateStore::update_target_status(self, name, status, checked_at)
    }

    fn append_snapshot(&self, snapshot: &Snapshot) -> StateResult<u64> {
        StateStore::append_snapshot(self, snapshot)
    }

    fn list_snapshots(&self) -> StateResult<Vec<Snapshot>> {
        StateStore::list_snapshots(self)
    }

    fn latest_snapshot(&self) -> StateResult<Option<Snapshot>> {
        StateStore::latest_snapshot(self)
    }
}
