//! Dashboard page handlers.
//!
//! Handlers read the history log and deployment records, build view types,
//! and render an Askama template. Store failures degrade to empty sections.

use askama::Template;
use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;
use tracing::warn;

use crate::DashboardState;
use crate::views::*;

/// History entries shown on the page.
const RECENT_LOGS: usize = 20;

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        format!("<pre>Template error: {e}</pre>")
    }))
}

/// Query string for the ad-hoc check.
#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub url: Option<String>,
}

// ── Overview ────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "dashboard.html")]
struct OverviewTemplate {
    pipeline: PipelineView,
    check_url: String,
    check: Option<OutcomeView>,
    latest: Option<SnapshotView>,
    logs: Vec<LogView>,
    deployments: Vec<DeploymentView>,
}

pub async fn overview(
    State(state): State<DashboardState>,
    Query(query): Query<CheckQuery>,
) -> Html<String> {
    let check_url = query.url.unwrap_or_default().trim().to_string();
    let check = if check_url.is_empty() {
        None
    } else {
        let outcome = state.health.check_url(&check_url).await;
        Some(OutcomeView::new(&check_url, &outcome))
    };

    let history = state.health.history().unwrap_or_else(|e| {
        warn!(error = %e, "dashboard could not read history log");
        Vec::new()
    });
    let latest = history.last().map(SnapshotView::from_snapshot);
    let logs = history
        .iter()
        .rev()
        .take(RECENT_LOGS)
        .map(LogView::from_snapshot)
        .collect();

    let deployments = state
        .tracker
        .history()
        .unwrap_or_else(|e| {
            warn!(error = %e, "dashboard could not read deployments");
            Vec::new()
        })
        .iter()
        .rev()
        .map(DeploymentView::from_record)
        .collect();

    render(OverviewTemplate {
        pipeline: PipelineView::from_status(state.tracker.pipeline_status()),
        check_url,
        check,
        latest,
        logs,
        deployments,
    })
}
