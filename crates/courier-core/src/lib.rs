//! # courier-core
//!
//! Shared vocabulary for the courier delivery workspace:
//!
//! - **Branded IDs**: [`SessionId`], [`ConnectionId`], [`UserId`] as newtypes
//! - **Principal**: the authenticated-user handle the transport hands to the core
//! - **Time**: [`TimeSource`] abstraction over epoch milliseconds
//! - **Logging**: `tracing` subscriber setup and an in-memory capture layer

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod principal;
pub mod time;

pub use ids::{ConnectionId, SessionId, UserId};
pub use principal::Principal;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
