//! Periodic timeout sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::ClientCache;

/// Spawn the sweep loop for `cache`.
///
/// Ticks every `ctx_timeout`, skipping the immediate first tick. The task
/// holds only a weak reference, so dropping the cache ends it, as does
/// cancelling the cache's token.
pub(crate) fn spawn_sweeper(cache: &Arc<ClientCache>) -> JoinHandle<()> {
    let weak = Arc::downgrade(cache);
    let cancel = cache.cancellation_token().clone();
    let period = cache.config().ctx_timeout.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(cache) = weak.upgrade() else { break };
                    let report = cache.sweep_now();
                    if report.expired > 0 || report.evicted > 0 || report.failures > 0 {
                        debug!(?report, "sweep pass");
                    }
                }
            }
        }
        info!("client sweeper stopped");
    })
}
