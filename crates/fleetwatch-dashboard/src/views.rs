//! View types for dashboard template rendering.
//!
//! These types carry pre-formatted strings so templates stay simple.

use fleetwatch_rollout::PipelineStatus;
use fleetwatch_state::{
    DeploymentRecord, DeploymentStatus, Snapshot, TargetOutcome, TargetStatus,
};

// ── Pipeline ────────────────────────────────────────────────────

pub struct PipelineView {
    pub label: &'static str,
    pub color: &'static str,
}

impl PipelineView {
    pub fn from_status(status: PipelineStatus) -> Self {
        let color = match status {
            PipelineStatus::Success => "ok",
            PipelineStatus::InProgress => "busy",
        };
        Self {
            label: status.as_str(),
            color,
        }
    }
}

// ── Targets ─────────────────────────────────────────────────────

pub struct OutcomeView {
    pub name: String,
    pub status: &'static str,
    pub color: &'static str,
    pub reason: String,
}

impl OutcomeView {
    pub fn new(name: &str, outcome: &TargetOutcome) -> Self {
        Self {
            name: name.to_string(),
            status: outcome.status.as_str(),
            color: status_color(outcome.status),
            reason: outcome.reason.clone().unwrap_or_default(),
        }
    }
}

/// Latest snapshot, flattened for the status table.
pub struct SnapshotView {
    pub checked: String,
    pub up: usize,
    pub down: usize,
    pub rows: Vec<OutcomeView>,
}

impl SnapshotView {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            checked: format_timestamp(snapshot.timestamp),
            up: snapshot.up_count(),
            down: snapshot.down_count(),
            rows: snapshot
                .statuses
                .iter()
                .map(|(name, outcome)| OutcomeView::new(name, outcome))
                .collect(),
        }
    }
}

// ── History ─────────────────────────────────────────────────────

pub struct LogView {
    pub time: String,
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub color: &'static str,
}

impl LogView {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let down = snapshot.down_count();
        Self {
            time: format_timestamp(snapshot.timestamp),
            total: snapshot.statuses.len(),
            up: snapshot.up_count(),
            down,
            color: if down > 0 { "down" } else { "up" },
        }
    }
}

// ── Deployments ─────────────────────────────────────────────────

pub struct DeploymentView {
    pub id: u64,
    pub version: String,
    pub status: &'static str,
    pub color: &'static str,
    pub started: String,
    pub completed: String,
}

impl DeploymentView {
    pub fn from_record(record: &DeploymentRecord) -> Self {
        let color = match record.status {
            DeploymentStatus::Success => "ok",
            DeploymentStatus::InProgress => "busy",
        };
        Self {
            id: record.id,
            version: record.version.clone(),
            status: record.status.as_str(),
            color,
            started: format_timestamp(record.timestamp),
            completed: record
                .completed_at
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────

pub fn status_color(status: TargetStatus) -> &'static str {
    match status {
        TargetStatus::Up => "up",
        TargetStatus::Down => "down",
        TargetStatus::Unknown => "unknown",
    }
}

/// Format epoch milliseconds as UTC wall time.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
