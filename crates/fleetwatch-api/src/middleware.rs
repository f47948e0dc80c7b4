//! Request guards: shared-secret authentication and per-client rate limits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::handlers::error_response;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Client key used when no forwarding header is present.
const ANONYMOUS: &str = "anonymous";

/// Distinct clients tracked before new ones share the anonymous bucket.
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

/// Configured shared secret. A blank secret counts as unset.
#[derive(Debug, Clone)]
pub struct ApiKey(Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.trim().is_empty()).map(Arc::from))
    }

    fn matches(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.0.as_deref() else {
            return false;
        };
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

/// Reject requests without the expected `x-api-key`.
///
/// With no secret configured every request is rejected.
pub async fn require_api_key(State(key): State<ApiKey>, req: Request, next: Next) -> Response {
    if key.0.is_none() {
        warn!(path = %req.uri().path(), "api key not configured, access denied");
        return error_response("unauthorized", StatusCode::UNAUTHORIZED).into_response();
    }
    if !key.matches(req.headers()) {
        warn!(path = %req.uri().path(), "rejected request with missing or invalid api key");
        return error_response("unauthorized", StatusCode::UNAUTHORIZED).into_response();
    }
    next.run(req).await
}

/// Fixed-window request counter keyed by client.
///
/// Tracks at most `max_clients` keys plus the shared anonymous bucket.
/// Clients seen once the table is full are counted under that bucket.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_clients: usize,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_max_clients(limit, window, DEFAULT_MAX_CLIENTS)
    }

    pub fn with_max_clients(limit: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            limit,
            window,
            max_clients,
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Count one request for `client`; false once the window is exhausted.
    pub fn check(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Expired windows are dropped at most once per window length.
        if now.duration_since(state.last_sweep) >= self.window {
            let window = self.window;
            state
                .windows
                .retain(|_, w| now.duration_since(w.started) < window);
            state.last_sweep = now;
        }

        let key = if state.windows.contains_key(client) || state.windows.len() < self.max_clients {
            client
        } else {
            debug!(%client, "rate limit table full, using shared bucket");
            ANONYMOUS
        };

        let entry = state.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .windows
            .len()
    }
}

/// First `x-forwarded-for` hop, or a shared anonymous bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

/// Answer 429 once a client exceeds its window.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(req.headers());
    if !limiter.check(&client) {
        warn!(%client, "rate limit exceeded");
        return error_response("rate limit exceeded", StatusCode::TOO_MANY_REQUESTS)
            .into_response();
    }
    next.run(req).await
}
