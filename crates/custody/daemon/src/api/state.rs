//! Application state for API handlers

use custody_oracle::AuthorizationOracle;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<AuthorizationOracle>,

    /// Daemon version
    pub version: String,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(oracle: Arc<AuthorizationOracle>) -> Self {
        Self {
            oracle,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the daemon started
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
