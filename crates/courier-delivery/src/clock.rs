//! Global message ordering.
//!
//! Every enqueue through one [`ClientCache`] is stamped by a single
//! [`SequenceClock`]. A stamp is the enqueue time truncated to the
//! millisecond plus a sequence number within that millisecond, so stamps
//! compare lexicographically and no two are equal.
//!
//! [`ClientCache`]: crate::cache::ClientCache

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use courier_core::TimeSource;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeliveryError;

/// Position of a message in the global order.
///
/// Field order matters: the derived `Ord` compares `timestamp` first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Epoch milliseconds at enqueue.
    pub timestamp: i64,
    /// Sequence within `timestamp`, starting at zero.
    pub sequence: u64,
}

impl Stamp {
    /// High-water mark of a client that has received nothing.
    pub const ZERO: Self = Self {
        timestamp: 0,
        sequence: 0,
    };

    /// Create a stamp.
    pub const fn new(timestamp: i64, sequence: u64) -> Self {
        Self {
            timestamp,
            sequence,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.timestamp, self.sequence)
    }
}

#[derive(Debug)]
struct ClockState {
    last_timestamp: i64,
    last_sequence: u64,
}

/// Hands out strictly increasing [`Stamp`]s.
pub struct SequenceClock {
    state: Mutex<ClockState>,
    time: Arc<dyn TimeSource>,
}

impl SequenceClock {
    /// Create a clock reading wall time from `time`.
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            state: Mutex::new(ClockState {
                last_timestamp: i64::MIN,
                last_sequence: 0,
            }),
            time,
        }
    }

    /// Stamp the next message, waiting at most `wait` for the lock.
    ///
    /// The lock is released before returning. Use [`acquire`](Self::acquire)
    /// when the stamped message must reach its recipients before any later one.
    pub fn next(&self, wait: Duration) -> Result<Stamp, DeliveryError> {
        self.acquire(wait).map(|guard| guard.stamp())
    }

    /// Stamp the next message and keep the clock locked until the returned
    /// guard is dropped.
    ///
    /// A wall clock that steps backwards does not break ordering: the stamp
    /// stays on the last issued millisecond and keeps counting.
    pub fn acquire(&self, wait: Duration) -> Result<StampGuard<'_>, DeliveryError> {
        let Some(mut state) = self.state.try_lock_for(wait) else {
            return Err(DeliveryError::ClockContended { waited: wait });
        };

        let now = self.time.now_ms();
        if now > state.last_timestamp {
            state.last_timestamp = now;
            state.last_sequence = 0;
        } else {
            if now < state.last_timestamp {
                debug!(
                    now,
                    last = state.last_timestamp,
                    "wall clock stepped backwards, holding last tick"
                );
            }
            state.last_sequence += 1;
        }

        let stamp = Stamp::new(state.last_timestamp, state.last_sequence);
        Ok(StampGuard {
            _state: state,
            stamp,
        })
    }

    /// The most recently issued stamp, if any.
    pub fn last(&self) -> Option<Stamp> {
        let state = self.state.lock();
        (state.last_timestamp != i64::MIN)
            .then(|| Stamp::new(state.last_timestamp, state.last_sequence))
    }

    #[cfg(test)]
    pub(crate) fn hold_for_test(&self) -> parking_lot::MutexGuard<'_, impl Sized> {
        self.state.lock()
    }
}

/// A freshly issued [`Stamp`] that holds the clock until dropped.
///
/// No later stamp can be issued while this is alive.
#[must_use = "dropping the guard releases the clock immediately"]
pub struct StampGuard<'a> {
    _state: MutexGuard<'a, ClockState>,
    stamp: Stamp,
}

impl StampGuard<'_> {
    /// The stamp this guard was issued with.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }
}

impl fmt::Debug for StampGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StampGuard").field(&self.stamp).finish()
    }
}

impl fmt::Debug for SequenceClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceClock")
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}
