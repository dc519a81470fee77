//! Two-tier backlog retention.
//!
//! A message is pinned for `strong` after it is stamped. Between the strong
//! and soft expiry it survives only in backlogs whose owner has not
//! acknowledged it yet. Past the soft expiry it is gone everywhere.

use std::time::Duration;

use courier_core::time::duration_ms;

use crate::clock::Stamp;
use crate::message::Message;

/// Strong and soft retention windows, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    strong_ms: i64,
    soft_ms: i64,
}

impl RetentionPolicy {
    /// Build a policy.
    ///
    /// A soft window shorter than the strong one is widened to
    /// `strong + soft`, so a message never soft-expires before it
    /// strong-expires.
    pub fn new(strong: Duration, soft: Duration) -> Self {
        let strong_ms = duration_ms(strong);
        let mut soft_ms = duration_ms(soft);
        if soft_ms < strong_ms {
            soft_ms = strong_ms.saturating_add(soft_ms);
        }
        Self { strong_ms, soft_ms }
    }

    /// Strong window in milliseconds.
    pub fn strong_ms(&self) -> i64 {
        self.strong_ms
    }

    /// Effective soft window in milliseconds.
    pub fn soft_ms(&self) -> i64 {
        self.soft_ms
    }

    /// `(strong_expiry, soft_expiry)` for a message stamped at `timestamp`.
    pub fn expiries(&self, timestamp: i64) -> (i64, i64) {
        (
            timestamp.saturating_add(self.strong_ms),
            timestamp.saturating_add(self.soft_ms),
        )
    }
}

/// Verdict for one backlog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retention {
    /// Stay in the backlog.
    Keep,
    /// Remove from the backlog.
    Evict,
}

impl Retention {
    /// Classify `message` for a client whose high-water mark is `last_received`.
    pub fn classify(message: &Message, now_ms: i64, last_received: Stamp) -> Self {
        if now_ms < message.strong_expiry_ms() {
            Self::Keep
        } else if now_ms <= message.soft_expiry_ms() {
            if last_received < message.stamp() {
                Self::Keep
            } else {
                Self::Evict
            }
        } else {
            Self::Evict
        }
    }
}
