//! Domain types for the Fleetwatch state store.
//!
//! These types represent the persisted registry of monitored targets, the
//! snapshots produced by each health-check cycle, and deployment records.
//! All types are serializable to/from JSON for storage in redb tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique name of a monitored target.
pub type TargetName = String;

/// Store-assigned deployment identifier.
pub type DeploymentId = u64;

// ── Target ────────────────────────────────────────────────────────

/// Last known reachability of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Registered but not probed yet.
    #[default]
    Unknown,
    Up,
    Down,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Target {
    pub name: TargetName,
    pub url: String,
    pub status: TargetStatus,
    /// Unix timestamp (milliseconds) of registration.
    pub created_at: u64,
    /// Unix timestamp (milliseconds) of the last status write.
    pub checked_at: Option<u64>,
}

impl Target {
    /// Build a freshly registered target in the `Unknown` state.
    pub fn new(name: impl Into<String>, url: impl Into<String>, created_at: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            status: TargetStatus::Unknown,
            created_at,
            checked_at: None,
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Classified result of probing one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetOutcome {
    pub status: TargetStatus,
    /// Short human-readable cause, set only when `status` is `Down`.
    pub reason: Option<String>,
}

impl TargetOutcome {
    pub fn up() -> Self {
        Self {
            status: TargetStatus::Up,
            reason: None,
        }
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self {
            status: TargetStatus::Down,
            reason: Some(reason.into()),
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == TargetStatus::Up
    }
}

/// The result of one health-check cycle. Immutable once logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Unix timestamp (milliseconds) when the cycle completed.
    pub timestamp: u64,
    /// Outcome per target name, covering every target registered at cycle start.
    pub statuses: BTreeMap<TargetName, TargetOutcome>,
}

impl Snapshot {
    /// Number of targets reported `Up`.
    pub fn up_count(&self) -> usize {
        self.statuses.values().filter(|o| o.is_up()).count()
    }

    /// Number of targets reported `Down`.
    pub fn down_count(&self) -> usize {
        self.statuses.len() - self.up_count()
    }
}

// ── Deployment ────────────────────────────────────────────────────

/// Lifecycle status of a simulated deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Success,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub version: String,
    pub status: DeploymentStatus,
    /// Unix timestamp (milliseconds) of creation.
    pub timestamp: u64,
    /// Unix timestamp (milliseconds) of the transition to `Success`.
    pub completed_at: Option<u64>,
}
