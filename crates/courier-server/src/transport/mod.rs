//! [`Transport`](courier_delivery::Transport) implementations for axum.
//!
//! - [`WsTransport`]: feeds a per-socket writer task through a bounded channel
//! - [`PollTransport`]: answers one parked HTTP request through a oneshot

pub mod poll;
pub mod ws;

pub use poll::{PollTransport, batch_body};
pub use ws::{Outbound, WsTransport, session_frame};
