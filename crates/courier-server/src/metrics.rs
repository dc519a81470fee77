//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if another recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections upgraded (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Long-poll requests received (counter).
pub const POLL_REQUESTS_TOTAL: &str = "poll_requests_total";
/// Long-poll requests answered by the handler's own safety timeout (counter).
pub const POLL_SAFETY_TIMEOUTS_TOTAL: &str = "poll_safety_timeouts_total";
/// Inbound client frames accepted (counter, labels: transport).
pub const INBOUND_FRAMES_TOTAL: &str = "inbound_frames_total";
/// Inbound client frames that failed to parse (counter).
pub const INBOUND_INVALID_TOTAL: &str = "inbound_invalid_total";
/// Requests rejected for missing or unknown credentials (counter).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
