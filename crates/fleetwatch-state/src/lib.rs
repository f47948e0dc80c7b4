//! fleetwatch-state: embedded state store for Fleetwatch.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the three durable collections of the service:
//!
//! - **targets**: the monitoring registry, unique by name
//! - **snapshots**: the append-only history log of health-check cycles
//! - **deployments**: simulated deployment attempts
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Targets are keyed by name; snapshots and deployments are keyed by a
//! monotonically increasing `u64` sequence so that a table scan returns them
//! in append order.
//!
//! Every mutating call runs inside a single redb write transaction. redb
//! serializes write transactions, so each call is atomic on its own.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
