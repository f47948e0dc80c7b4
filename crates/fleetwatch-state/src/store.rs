//! StateStore: redb-backed state persistence for Fleetwatch.
//!
//! Provides typed operations over the target registry, the snapshot history
//! log, and deployment records. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TARGETS).map_err(map_err!(Table))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Targets ────────────────────────────────────────────────────

    /// Register a new target. Fails with `AlreadyExists` if the name is taken;
    /// the existing record is left untouched.
    pub fn add_target(&self, target: &Target) -> StateResult<()> {
        let value = serde_json::to_vec(target).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            // Check and insert under the same write transaction.
            if table
                .get(target.name.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::AlreadyExists(target.name.clone()));
            }
            table
                .insert(target.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %target.name, url = %target.url, "target registered");
        Ok(())
    }

    /// Get a target by name.
    pub fn get_target(&self, name: &str) -> StateResult<Option<Target>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let target: Target =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// List all targets from a single read transaction (point-in-time view).
    pub fn list_targets(&self) -> StateResult<Vec<Target>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let target: Target =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(target);
        }
        Ok(results)
    }

    /// Remove a target by name, returning the removed record.
    pub fn remove_target(&self, name: &str) -> StateResult<Target> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            removed = match table.remove(name).map_err(map_err!(Write))? {
                Some(guard) => serde_json::from_slice::<Target>(guard.value())
                    .map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(name.to_string())),
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, "target removed");
        Ok(removed)
    }

    /// Overwrite the status of an existing target.
    ///
    /// Returns `false` without writing when the target no longer exists, so a
    /// write racing a removal never resurrects the record.
    pub fn update_target_status(
        &self,
        name: &str,
        status: TargetStatus,
        checked_at: u64,
    ) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TARGETS).map_err(map_err!(Table))?;
            let existing = table
                .get(name)
                .map_err(map_err!(Read))?
                .map(|guard| serde_json::from_slice::<Target>(guard.value()))
                .transpose()
                .map_err(map_err!(Deserialize))?;
            let Some(mut target) = existing else {
                debug!(%name, "status update skipped, target gone");
                return Ok(false);
            };
            target.status = status;
            target.checked_at = Some(checked_at);
            let value = serde_json::to_vec(&target).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(true)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Append a snapshot to the history log. Returns its sequence number.
    pub fn append_snapshot(&self, snapshot: &Snapshot) -> StateResult<u64> {
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            seq = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(0);
            table
                .insert(seq, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(seq, targets = snapshot.statuses.len(), "snapshot appended");
        Ok(seq)
    }

    /// List every logged snapshot in append order.
    pub fn list_snapshots(&self) -> StateResult<Vec<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let snapshot: Snapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(snapshot);
        }
        Ok(results)
    }

    /// The most recently appended snapshot, if any.
    pub fn latest_snapshot(&self) -> StateResult<Option<Snapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.last().map_err(map_err!(Read))? {
            Some((_, value)) => {
                let snapshot: Snapshot =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Record a new in-progress deployment and assign it the next id.
    pub fn create_deployment(&self, version: &str, timestamp: u64) -> StateResult<DeploymentRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let id = table
                .last()
                .map_err(map_err!(Read))?
                .map(|(key, _)| key.value() + 1)
                .unwrap_or(1);
            record = DeploymentRecord {
                id,
                version: version.to_string(),
                status: DeploymentStatus::InProgress,
                timestamp,
                completed_at: None,
            };
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = record.id, version = %record.version, "deployment stored");
        Ok(record)
    }

    /// Get a deployment by id.
    pub fn get_deployment(&self, id: DeploymentId) -> StateResult<Option<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DeploymentRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all deployments in creation order.
    pub fn list_deployments(&self) -> StateResult<Vec<DeploymentRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: DeploymentRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Move a deployment to `Success`.
    ///
    /// A record that is already `Success` is returned unchanged; the
    /// transition happens at most once.
    pub fn complete_deployment(
        &self,
        id: DeploymentId,
        completed_at: u64,
    ) -> StateResult<DeploymentRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let existing = table
                .get(id)
                .map_err(map_err!(Read))?
                .map(|guard| serde_json::from_slice::<DeploymentRecord>(guard.value()))
                .transpose()
                .map_err(map_err!(Deserialize))?;
            let Some(mut current) = existing else {
                return Err(StateError::NotFound(format!("deployment {id}")));
            };
            if current.status == DeploymentStatus::Success {
                return Ok(current);
            }
            current.status = DeploymentStatus::Success;
            current.completed_at = Some(completed_at);
            let value = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            record = current;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id, "deployment completed");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_snapshot(timestamp: u64, names: &[&str]) -> Snapshot {
        let statuses = names
            .iter()
            .map(|n| (n.to_string(), TargetOutcome::up()))
            .collect::<BTreeMap<_, _>>();
        Snapshot { timestamp, statuses }
    }

    // ── Target registry ────────────────────────────────────────────

    #[test]
    fn target_add_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let target = Target::new("api", "http://10.0.0.1/healthz", 1000);

        store.add_target(&target).unwrap();
        let retrieved = store.get_target("api").unwrap();

        assert_eq!(retrieved, Some(target));
    }

    #[test]
    fn target_duplicate_is_rejected_and_original_kept() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .add_target(&Target::new("api", "http://first", 1000))
            .unwrap();

        let err = store
            .add_target(&Target::new("api", "http://second", 2000))
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(ref n) if n == "api"));

        let kept = store.get_target("api").unwrap().unwrap();
        assert_eq!(kept.url, "http://first");
        assert_eq!(kept.created_at, 1000);
    }

    #[test]
    fn target_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_target(&Target::new("a", "http://a", 1)).unwrap();
        store.add_target(&Target::new("b", "http://b", 2)).unwrap();
        store.add_target(&Target::new("c", "http://c", 3)).unwrap();

        let names: Vec<String> = store
            .list_targets()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn target_remove_returns_record() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_target(&Target::new("api", "http://api", 1)).unwrap();

        let removed = store.remove_target("api").unwrap();
        assert_eq!(removed.name, "api");
        assert!(store.get_target("api").unwrap().is_none());
    }

    #[test]
    fn target_remove_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.remove_target("ghost").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn target_status_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_target(&Target::new("api", "http://api", 1)).unwrap();

        assert!(store.update_target_status("api", TargetStatus::Down, 50).unwrap());
        // Idempotent.
        assert!(store.update_target_status("api", TargetStatus::Down, 60).unwrap());

        let target = store.get_target("api").unwrap().unwrap();
        assert_eq!(target.status, TargetStatus::Down);
        assert_eq!(target.checked_at, Some(60));
        assert_eq!(target.url, "http://api");
    }

    #[test]
    fn target_status_update_after_remove_is_noop() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_target(&Target::new("api", "http://api", 1)).unwrap();
        store.remove_target("api").unwrap();

        assert!(!store.update_target_status("api", TargetStatus::Up, 10).unwrap());
        assert!(store.get_target("api").unwrap().is_none());
    }

    #[test]
    fn concurrent_adds_of_same_name_admit_exactly_one() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .add_target(&Target::new("shared", format!("http://{i}"), i))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.list_targets().unwrap().len(), 1);
    }

    // ── Snapshot history ───────────────────────────────────────────

    #[test]
    fn snapshots_keep_append_order() {
        let store = StateStore::open_in_memory().unwrap();
        // Timestamps deliberately out of order: only append order counts.
        for (i, ts) in [30u64, 10, 20, 50, 40].into_iter().enumerate() {
            let seq = store.append_snapshot(&test_snapshot(ts, &["a"])).unwrap();
            assert_eq!(seq, i as u64);
        }

        let all = store.list_snapshots().unwrap();
        let stamps: Vec<u64> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![30, 10, 20, 50, 40]);
    }

    #[test]
    fn latest_snapshot_is_last_appended() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.latest_snapshot().unwrap().is_none());

        store.append_snapshot(&test_snapshot(1, &["a"])).unwrap();
        store.append_snapshot(&test_snapshot(2, &["a", "b"])).unwrap();

        let latest = store.latest_snapshot().unwrap().unwrap();
        assert_eq!(latest.timestamp, 2);
        assert_eq!(latest.statuses.len(), 2);
    }

    // ── Deployments ────────────────────────────────────────────────

    #[test]
    fn deployment_create_assigns_sequential_ids() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store.create_deployment("1.0.0", 100).unwrap();
        let second = store.create_deployment("1.0.1", 200).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, DeploymentStatus::InProgress);

        let all = store.list_deployments().unwrap();
        assert_eq!(all, vec![first, second]);
    }

    #[test]
    fn deployment_completes_once() {
        let store = StateStore::open_in_memory().unwrap();
        let record = store.create_deployment("1.2.3", 100).unwrap();

        let done = store.complete_deployment(record.id, 300).unwrap();
        assert_eq!(done.status, DeploymentStatus::Success);
        assert_eq!(done.completed_at, Some(300));

        // Second completion leaves the first transition in place.
        let again = store.complete_deployment(record.id, 900).unwrap();
        assert_eq!(again.completed_at, Some(300));

        let stored = store.get_deployment(record.id).unwrap().unwrap();
        assert_eq!(stored, done);
    }

    #[test]
    fn deployment_complete_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.complete_deployment(42, 1).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.add_target(&Target::new("api", "http://api", 1)).unwrap();
            store.append_snapshot(&test_snapshot(5, &["api"])).unwrap();
            store.create_deployment("2.0.0", 7).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.list_targets().unwrap().len(), 1);
        assert_eq!(store.list_snapshots().unwrap().len(), 1);
        // Sequence continues after reopen.
        let next = store.create_deployment("2.0.1", 8).unwrap();
        assert_eq!(next.id, 2);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_targets().unwrap().is_empty());
        assert!(store.list_snapshots().unwrap().is_empty());
        assert!(store.list_deployments().unwrap().is_empty());
        assert!(store.get_target("nope").unwrap().is_none());
        assert!(store.get_deployment(1).unwrap().is_none());
    }
}
