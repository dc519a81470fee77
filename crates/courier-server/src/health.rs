//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while serving, `"shuttingDown"` once shutdown has begun.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered delivery clients.
    pub clients: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, clients: usize, shutting_down: bool) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shuttingDown" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        clients,
    }
}
