//! Listener, authentication and logging settings.

use courier_core::Principal;
use serde::{Deserialize, Serialize};

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Route for WebSocket upgrades.
    pub ws_path: String,
    /// Route for long-poll requests.
    pub long_poll_path: String,
    /// Largest inbound frame or request body accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of each socket's outbound queue.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25_000,
            ws_path: "/ws/panel".to_string(),
            long_poll_path: "/longpoll/panel".to_string(),
            max_message_size: 1024 * 1024,
            outbound_buffer: 1024,
        }
    }
}

/// A user allowed to attach, identified by a static bearer token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    /// Login name. Also used as the user ID.
    pub username: String,
    /// Bearer token presented by clients.
    pub token: String,
}

impl UserToken {
    /// The principal this token authenticates as.
    pub fn principal(&self) -> Principal {
        Principal::new(self.username.to_lowercase(), self.username.clone())
    }
}

/// Authentication settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Known users.
    pub users: Vec<UserToken>,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
