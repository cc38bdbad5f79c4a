use std::sync::Arc;
use std::time::Duration;
use uos_core::AppCore;

use crate::middleware::RateLimiter;

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(core: Arc<AppCore>) -> Self {
        let rate = &core.config.rate_limit;
        let limiter = RateLimiter::new(rate.max_requests, Duration::from_secs(rate.window_secs));
        Self { core, limiter }
    }
}
