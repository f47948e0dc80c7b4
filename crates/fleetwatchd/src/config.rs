//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// File name of the redb database inside the data directory.
pub const DB_FILE: &str = "fleetwatch.redb";

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,fleetwatchd=debug,fleetwatch=debug";

#[derive(Debug, Parser)]
#[command(name = "fleetwatchd", about = "Fleetwatch daemon", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the API and dashboard, and run periodic health checks.
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "FLEETWATCH_PORT", default_value = "8080")]
    pub port: u16,

    /// Data directory for persistent state.
    #[arg(long, env = "FLEETWATCH_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Shared secret expected in the `x-api-key` header.
    #[arg(long, env = "FLEETWATCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Webhook receiving `{"text": ...}` notifications.
    #[arg(long, env = "FLEETWATCH_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Seconds between background health checks (0 disables them).
    #[arg(long, env = "FLEETWATCH_CHECK_INTERVAL", default_value = "60")]
    pub check_interval: u64,

    /// Per-probe timeout in milliseconds.
    #[arg(
        long,
        env = "FLEETWATCH_PROBE_TIMEOUT_MS",
        default_value = "3000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_timeout_ms: u64,

    /// Milliseconds a deployment stays in progress.
    #[arg(long, env = "FLEETWATCH_DEPLOY_DELAY_MS", default_value = "2000")]
    pub deploy_delay_ms: u64,

    /// Treat non-2xx probe responses as down.
    #[arg(long, env = "FLEETWATCH_STRICT_PROBES")]
    pub strict_probes: bool,

    /// Requests per client per minute (0 disables limiting).
    #[arg(long, env = "FLEETWATCH_RATE_LIMIT", default_value = "100")]
    pub rate_limit: u32,

    /// Emit logs as JSON lines.
    #[arg(long, env = "FLEETWATCH_LOG_JSON")]
    pub log_json: bool,
}

impl ServeArgs {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Background check interval, `None` when disabled.
    pub fn check_interval(&self) -> Option<Duration> {
        (self.check_interval > 0).then(|| Duration::from_secs(self.check_interval))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn deploy_delay(&self) -> Duration {
        Duration::from_millis(self.deploy_delay_ms)
    }
}
