//! # courier-delivery
//!
//! Ordered, replayable delivery of server-originated messages to browser
//! sessions that come and go over WebSocket or long polling.
//!
//! - [`SequenceClock`] stamps every message with a globally ordered [`Stamp`]
//! - [`Client`] holds one session's backlog and its current [`Transport`]
//! - [`ClientCache`] is the registry and send surface; its sweep pings idle
//!   sockets, releases parked polls, applies [`RetentionPolicy`] and expires
//!   abandoned sessions
//!
//! Sends are best-effort: a message that cannot be stamped in time is
//! logged and dropped rather than blocking the caller.

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod clock;
pub mod errors;
pub mod message;
pub mod metrics;
pub mod retention;
mod sweep;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheConfig, ClientCache, SweepReport};
pub use client::{Client, ClientState, TimeoutOutcome};
pub use clock::{SequenceClock, Stamp};
pub use errors::DeliveryError;
pub use message::Message;
pub use retention::{Retention, RetentionPolicy};
pub use transport::{ConnectionContext, DeliveryMode, Transport};
