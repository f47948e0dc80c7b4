//! fleetwatch-api: REST API for Fleetwatch.
//!
//! Provides axum route handlers for the target registry, health status,
//! history log, deployments and notifications. Mounts the dashboard under
//! `/dashboard`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness (no auth) |
//! | GET | `/api/v1/status` | Run a health cycle |
//! | GET | `/api/v1/status/latest` | Latest logged snapshot |
//! | GET | `/api/v1/targets` | List targets |
//! | POST | `/api/v1/targets` | Register a target |
//! | DELETE | `/api/v1/targets/{name}` | Remove a target |
//! | GET | `/api/v1/deployments` | Deployment history |
//! | POST | `/api/v1/deployments` | Start a deployment |
//! | GET | `/api/v1/logs` | Health history log |
//! | POST | `/api/v1/notify` | Send a status report to the webhook |
//!
//! Every route except `/health` requires the `x-api-key` header. When rate
//! limiting is enabled it applies to the same routes.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};

use fleetwatch_health::HealthOrchestrator;
use fleetwatch_notify::Notifier;
use fleetwatch_rollout::DeploymentTracker;
use fleetwatch_state::StateStore;

use crate::middleware::{ApiKey, RateLimiter};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub health: HealthOrchestrator,
    pub tracker: DeploymentTracker,
    pub notifier: Notifier,
}

/// Access control for the router.
#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    /// Shared secret expected in `x-api-key`. `None` locks every protected
    /// route.
    pub api_key: Option<String>,
    /// Requests per client per minute; 0 disables limiting.
    pub rate_limit: u32,
}

/// Build the complete router (REST + dashboard + liveness).
pub fn build_router(state: ApiState, access: AccessConfig) -> Router {
    let dashboard_state = fleetwatch_dashboard::DashboardState {
        health: state.health.clone(),
        tracker: state.tracker.clone(),
    };

    let api_routes = Router::new()
        .route("/status", get(handlers::run_status))
        .route("/status/latest", get(handlers::latest_status))
        .route(
            "/targets",
            get(handlers::list_targets).post(handlers::register_target),
        )
        .route("/targets/{name}", delete(handlers::remove_target))
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::start_deployment),
        )
        .route("/logs", get(handlers::list_logs))
        .route("/notify", post(handlers::send_report))
        .with_state(state);

    let mut protected = Router::new()
        .nest("/api/v1", api_routes)
        .nest(
            "/dashboard",
            fleetwatch_dashboard::dashboard_router(dashboard_state),
        )
        .layer(from_fn_with_state(
            ApiKey::new(access.api_key),
            middleware::require_api_key,
        ));

    if access.rate_limit > 0 {
        let limiter = Arc::new(RateLimiter::per_minute(access.rate_limit));
        protected = protected.layer(from_fn_with_state(limiter, middleware::rate_limit));
    }

    protected.route("/health", get(handlers::health))
}
