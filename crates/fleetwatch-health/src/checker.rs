//! Health check probe logic.
//!
//! Performs a single bounded HTTP GET against a target URL and classifies
//! the result. Probes never return errors: every failure mode resolves to
//! a `Down` outcome carrying a short reason.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use fleetwatch_state::{TargetOutcome, TargetStatus};

/// Reason used when a failure carries no usable message.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// Boxed future returned by [`Probe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = TargetOutcome> + Send + 'a>>;

/// A network check against one URL.
///
/// Implementations must honour `timeout` and must not panic or retry; the
/// orchestrator owns cycling.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a>;
}

/// HTTP GET prober backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    /// Classify non-2xx responses as `Down`.
    strict: bool,
}

impl HttpProber {
    /// Create a prober that treats any HTTP response as `Up`.
    ///
    /// Fails when the HTTP client cannot be initialized (e.g. TLS backend).
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fleetwatch-health/0.1")
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a prober around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            strict: false,
        }
    }

    /// Require a 2xx status for `Up`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Probe for HttpProber {
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(http_probe(&self.client, url, timeout, self.strict))
    }
}

/// Perform an HTTP health probe against `url`.
///
/// Any response is `Up` unless `strict` is set, in which case non-2xx
/// responses are `Down` with the canonical status text as reason. Timeouts
/// and transport errors are `Down`.
pub async fn http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    strict: bool,
) -> TargetOutcome {
    let request = client.get(url).timeout(timeout).send();

    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(resp)) => {
            let status = resp.status();
            if strict && !status.is_success() {
                debug!(%status, %url, "health probe non-2xx");
                TargetOutcome::down(status_reason(status))
            } else {
                debug!(%status, %url, "health probe answered");
                TargetOutcome::up()
            }
        }
        Ok(Err(e)) => {
            let reason = if e.is_timeout() {
                timeout_reason(timeout)
            } else {
                error_reason(&e)
            };
            debug!(error = %e, %url, %reason, "health probe request failed");
            TargetOutcome::down(reason)
        }
        Err(_) => {
            debug!(%url, "health probe timed out");
            TargetOutcome::down(timeout_reason(timeout))
        }
    }
}

/// Reason reported for a probe that exceeded its deadline.
pub fn timeout_reason(timeout: Duration) -> String {
    format!("timeout of {}ms exceeded", timeout.as_millis())
}

/// Force the `reason` invariant: set only, and always, for `Down`.
pub fn normalize(outcome: TargetOutcome) -> TargetOutcome {
    match outcome.status {
        TargetStatus::Down => match outcome.reason {
            Some(reason) if !reason.trim().is_empty() => TargetOutcome::down(reason),
            _ => TargetOutcome::down(UNKNOWN_ERROR),
        },
        status => TargetOutcome {
            status,
            reason: None,
        },
    }
}

fn status_reason(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}

/// Prefer the protocol status text, then the innermost error message.
fn error_reason(err: &reqwest::Error) -> String {
    if let Some(status) = err.status() {
        return status_reason(status);
    }

    let mut source: &dyn std::error::Error = err;
    while let Some(next) = source.source() {
        source = next;
    }
    let message = source.to_string();
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}
