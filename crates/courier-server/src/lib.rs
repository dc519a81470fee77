//! # courier-server
//!
//! Axum front end for the courier delivery core.
//!
//! - `WebSocket` endpoint: one socket per session, replay on reconnect, keepalive pings
//! - Long-poll endpoint: `GET` parks until there is something to deliver, `POST` sends upstream
//! - Static bearer-token authentication (header or `token` query parameter)
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod inbound;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use auth::TokenAuthenticator;
pub use config::{ServerConfig, cache_config};
pub use errors::{Result, ServerError};
pub use inbound::{InboundHandler, InboundMessage, LoggingInboundHandler};
pub use server::{AppState, CourierServer};
pub use shutdown::{ShutdownCoordinator, wait_for_signal};
