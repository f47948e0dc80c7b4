//! Plain-text status report.

use fleetwatch_rollout::PipelineStatus;
use fleetwatch_state::{Snapshot, TargetStatus};

/// Render a snapshot and pipeline status as a chat-friendly message.
pub fn format_report(snapshot: &Snapshot, pipeline: PipelineStatus) -> String {
    let mut lines = vec![
        "Fleetwatch status report".to_string(),
        format!("Pipeline: {pipeline}"),
        format!(
            "Targets: {} up, {} down",
            snapshot.up_count(),
            snapshot.down_count()
        ),
    ];

    lines.extend(snapshot.statuses.iter().map(|(name, outcome)| {
        match &outcome.reason {
            Some(reason) => format!("- {name}: {} ({reason})", outcome.status),
            None => format!("- {name}: {}", outcome.status),
        }
    }));
    lines.join("\n")
}

/// Names of targets whose status moved since `previous`.
///
/// Without a previous snapshot only `Down` targets count as changes, so a
/// healthy fleet stays quiet on startup.
pub fn status_changes(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<String> {
    current
        .statuses
        .iter()
        .filter(|(name, outcome)| match previous {
            Some(prev) => prev
                .statuses
                .get(*name)
                .is_none_or(|before| before.status != outcome.status),
            None => outcome.status == TargetStatus::Down,
        })
        .map(|(name, _)| name.clone())
        .collect()
}
