//! Per-client admission control for chat intake.

use axum::http::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const FALLBACK_CLIENT: &str = "unknown";

/// Calls between map-wide sweeps of clients with no hits left in the window.
const SWEEP_INTERVAL: u64 = 1024;

/// Sliding-window counter keyed by client address.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
}

struct RateLimitState {
    limit: u64,
    window: Duration,
    hits: HashMap<String, VecDeque<Instant>>,
    calls_until_sweep: u64,
}

impl RateLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                limit,
                window,
                hits: HashMap::new(),
                calls_until_sweep: SWEEP_INTERVAL,
            })),
        }
    }

    /// Whether the client may submit another request right now. Admission
    /// fails closed if the counter state is unavailable.
    pub fn allow(&self, client: &str) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        let now = Instant::now();
        let window = state.window;
        let limit = state.limit;

        // Keys come from the caller, and a client that never returns never
        // prunes its own entry; the periodic sweep drops it instead
        state.calls_until_sweep -= 1;
        if state.calls_until_sweep == 0 {
            state.calls_until_sweep = SWEEP_INTERVAL;
            state.hits.retain(|_, hits| {
                prune_window(hits, now, window);
                !hits.is_empty()
            });
        }

        let hits = state.hits.entry(client.to_string()).or_default();
        prune_window(hits, now, window);

        if hits.len() as u64 >= limit {
            return false;
        }

        hits.push_back(now);
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state.lock().unwrap().hits.len()
    }
}

fn prune_window(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = hits.front() {
        if now.duration_since(*front) > window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

/// Requests are keyed by the first hop of `x-forwarded-for`; anything
/// without one shares a single bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(FALLBACK_CLIENT)
        .to_string()
}
