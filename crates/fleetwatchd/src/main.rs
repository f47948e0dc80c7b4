//! fleetwatchd: the Fleetwatch daemon.
//!
//! Single binary that assembles all Fleetwatch subsystems:
//! - State store (redb)
//! - Health orchestrator and periodic check loop
//! - Deployment tracker
//! - Webhook notifier
//! - REST API + dashboard
//!
//! # Usage
//!
//! ```text
//! fleetwatchd serve --port 8080 --data-dir /var/lib/fleetwatch --api-key s3cret
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleetwatch_api::{AccessConfig, ApiState};
use fleetwatch_health::{CycleCallback, CycleFuture, HealthOrchestrator, HttpProber};
use fleetwatch_notify::{Notifier, format_report, status_changes};
use fleetwatch_rollout::DeploymentTracker;
use fleetwatch_state::{Snapshot, StateStore};

use crate::config::{Cli, Command, DEFAULT_LOG_FILTER, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_tracing(args.log_json);
            run_serve(args).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("Fleetwatch daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.db_path();

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let notifier = Notifier::new(args.webhook_url.clone())?;
    info!(configured = notifier.is_configured(), "notifier initialized");

    let tracker = DeploymentTracker::with_delay(store.clone(), args.deploy_delay());
    info!(delay_ms = args.deploy_delay_ms, "deployment tracker initialized");

    let prober = HttpProber::new()?.strict(args.strict_probes);
    let mut health = HealthOrchestrator::with_prober(store.clone(), Arc::new(prober))
        .with_probe_timeout(args.probe_timeout());
    if notifier.is_configured() {
        let last = health.latest().unwrap_or_else(|e| {
            error!(error = %e, "could not read latest snapshot");
            None
        });
        health = health.with_callback(change_notifier(notifier.clone(), tracker.clone(), last));
    }
    info!(
        timeout_ms = args.probe_timeout_ms,
        strict = args.strict_probes,
        "health orchestrator initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let check_handle = match args.check_interval() {
        Some(interval) => {
            let runner = health.clone();
            Some(tokio::spawn(async move {
                runner.run(interval, shutdown_rx).await;
            }))
        }
        None => {
            info!("periodic health checks disabled");
            None
        }
    };

    // ── Start API server ───────────────────────────────────────

    let state = ApiState {
        store,
        health,
        tracker: tracker.clone(),
        notifier,
    };
    let access = AccessConfig {
        api_key: args.api_key.clone(),
        rate_limit: args.rate_limit,
    };
    if access.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
        warn!("no api key configured; every protected route will answer 401");
    }
    let router = fleetwatch_api::build_router(state, access);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    if let Some(handle) = check_handle {
        let _ = handle.await;
    }
    info!(pending = tracker.pending().await, "cancelling pending deployment completions");
    tracker.shutdown().await;

    info!("Fleetwatch daemon stopped");
    Ok(())
}

/// Send a status report whenever a background cycle changes a target's
/// status. `last` seeds the comparison so a restart does not re-announce
/// the logged state.
fn change_notifier(
    notifier: Notifier,
    tracker: DeploymentTracker,
    last: Option<Snapshot>,
) -> CycleCallback {
    let previous = Arc::new(Mutex::new(last));
    Arc::new(move |snapshot: Snapshot| -> CycleFuture {
        let notifier = notifier.clone();
        let tracker = tracker.clone();
        let previous = previous.clone();
        Box::pin(async move {
            let mut previous = previous.lock().await;
            let changed = status_changes(previous.as_ref(), &snapshot);
            if !changed.is_empty() {
                info!(?changed, "target status changed, notifying");
                notifier.notify_detached(format_report(&snapshot, tracker.pipeline_status()));
            }
            *previous = Some(snapshot);
        })
    })
}
