//! fleetwatch-dashboard: server-rendered status page for Fleetwatch.
//!
//! A single page showing the pipeline status, the latest logged health
//! snapshot, recent history and deployments. Rendering never probes the
//! fleet; the optional `?url=` query runs one ad-hoc check instead.
//!
//! # Routes
//!
//! | Route | Handler |
//! |---|---|
//! | `/dashboard` | Status overview |
//! | `/dashboard?url=...` | Overview plus an ad-hoc check of `url` |

pub mod pages;
pub mod views;

use axum::Router;
use axum::routing::get;

use fleetwatch_health::HealthOrchestrator;
use fleetwatch_rollout::DeploymentTracker;

/// Shared state for dashboard handlers.
#[derive(Clone)]
pub struct DashboardState {
    pub health: HealthOrchestrator,
    pub tracker: DeploymentTracker,
}

/// Build the dashboard router.
pub fn dashboard_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(pages::overview))
        .with_state(state)
}
