//! Metric names emitted by the delivery core.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

/// Messages stamped and fanned out (counter).
pub const MESSAGES_ENQUEUED_TOTAL: &str = "delivery_messages_enqueued_total";
/// Messages dropped because the sequence clock was contended (counter).
pub const MESSAGES_DROPPED_TOTAL: &str = "delivery_messages_dropped_total";
/// Backlog entries removed by the retention sweep (counter).
pub const MESSAGES_EVICTED_TOTAL: &str = "delivery_messages_evicted_total";
/// Messages replayed on attach (counter).
pub const MESSAGES_REPLAYED_TOTAL: &str = "delivery_messages_replayed_total";
/// Clients removed after idling out or explicit removal (counter).
pub const CLIENTS_EXPIRED_TOTAL: &str = "delivery_clients_expired_total";
/// Registered clients (gauge).
pub const CLIENTS_ACTIVE: &str = "delivery_clients_active";
/// Keepalive pings sent to idle sockets (counter).
pub const KEEPALIVE_PINGS_TOTAL: &str = "delivery_keepalive_pings_total";
/// Parked polls released empty by the sweep (counter).
pub const POLL_TIMEOUTS_TOTAL: &str = "delivery_poll_timeouts_total";
/// Per-client sweep failures (counter).
pub const SWEEP_FAILURES_TOTAL: &str = "delivery_sweep_failures_total";
