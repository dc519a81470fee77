//! Stamped outbound messages.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::clock::Stamp;
use crate::errors::DeliveryError;
use crate::retention::RetentionPolicy;

/// Wire envelope: `{"metadata":{"timestamp":..,"sequence":..},"data":..}`.
#[derive(Serialize)]
struct Envelope<'a> {
    metadata: Stamp,
    data: &'a Value,
}

/// An immutable, stamped payload shared by every backlog it lands in.
///
/// The envelope is rendered once at construction; transports push the
/// same `Arc<str>` to every recipient.
#[derive(Clone)]
pub struct Message {
    stamp: Stamp,
    payload: Value,
    frame: Arc<str>,
    strong_expiry_ms: i64,
    soft_expiry_ms: i64,
}

impl Message {
    /// Stamp `payload` and compute its expiries from `policy`.
    pub fn new(stamp: Stamp, payload: Value, policy: &RetentionPolicy) -> Result<Self, DeliveryError> {
        let frame = serde_json::to_string(&Envelope {
            metadata: stamp,
            data: &payload,
        })?;
        let (strong_expiry_ms, soft_expiry_ms) = policy.expiries(stamp.timestamp);
        Ok(Self {
            stamp,
            payload,
            frame: Arc::from(frame),
            strong_expiry_ms,
            soft_expiry_ms,
        })
    }

    /// Position in the global order.
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The serialized envelope.
    pub fn frame(&self) -> &Arc<str> {
        &self.frame
    }

    /// Until this instant the message is kept unconditionally.
    pub fn strong_expiry_ms(&self) -> i64 {
        self.strong_expiry_ms
    }

    /// After this instant the message is evicted everywhere.
    pub fn soft_expiry_ms(&self) -> i64 {
        self.soft_expiry_ms
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.stamp == other.stamp
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("stamp", &self.stamp)
            .field("strong_expiry_ms", &self.strong_expiry_ms)
            .field("soft_expiry_ms", &self.soft_expiry_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(Duration::from_secs(5), Duration::from_secs(30))
    }

    #[test]
    fn frame_is_metadata_then_data() {
        let m = Message::new(Stamp::new(1_700_000_000_123, 0), json!({"x": 1}), &policy()).unwrap();
        let parsed: Value = serde_json::from_str(m.frame()).unwrap();
        assert_eq!(
            parsed,
            json!({
                "metadata": {"timestamp": 1_700_000_000_123_i64, "sequence": 0},
                "data": {"x": 1}
            })
        );
        assert!(m.frame().starts_with(r#"{"metadata":"#));
    }

    #[test]
    fn expiries_follow_policy() {
        let m = Message::new(Stamp::new(10_000, 4), Value::Null, &policy()).unwrap();
        assert_eq!(m.strong_expiry_ms(), 15_000);
        assert_eq!(m.soft_expiry_ms(), 40_000);
    }

    #[test]
    fn equality_is_by_stamp() {
        let a = Message::new(Stamp::new(1, 1), json!("a"), &policy()).unwrap();
        let b = Message::new(Stamp::new(1, 1), json!("b"), &policy()).unwrap();
        let c = Message::new(Stamp::new(1, 2), json!("a"), &policy()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn payload_is_kept_verbatim() {
        let m = Message::new(Stamp::ZERO, json!([1, "two", null]), &policy()).unwrap();
        assert_eq!(m.payload(), &json!([1, "two", null]));
    }
}
