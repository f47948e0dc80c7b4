//! redb table definitions for the Fleetwatch state store.
//!
//! Values are JSON-serialized domain types. Sequence-keyed tables rely on
//! redb's ordered iteration to return records in append order.

use redb::TableDefinition;

/// Monitored targets keyed by `{name}`.
pub const TARGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("targets");

/// Health-check snapshots keyed by append sequence.
pub const SNAPSHOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("snapshots");

/// Deployment records keyed by deployment id (append sequence).
pub const DEPLOYMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("deployments");
