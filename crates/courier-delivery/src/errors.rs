//! Delivery error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised inside the delivery core.
///
/// None of these cross the public broadcast surface: [`ClientCache::enqueue`]
/// logs and drops. They are returned from the `try_*` variants so callers
/// that care can observe the drop.
///
/// [`ClientCache::enqueue`]: crate::cache::ClientCache::enqueue
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The sequence clock lock could not be acquired in time.
    #[error("sequence clock busy for {}ms, message dropped", waited.as_millis())]
    ClockContended {
        /// How long the caller waited.
        waited: Duration,
    },
    /// The payload could not be rendered into an envelope frame.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}
