//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may name only the fields it wants to change.

mod delivery;
mod server;

pub use delivery::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings for the courier server.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "delivery": { "ctxTimeoutMs": 15000 },
///   "auth": { "users": [{ "username": "admin", "token": "s3cret" }] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Listener and route settings.
    pub server: ServerSettings,
    /// Delivery core timeouts.
    pub delivery: DeliverySettings,
    /// Static bearer-token users.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}
