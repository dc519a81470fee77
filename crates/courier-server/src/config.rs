//! Server configuration.

use std::time::Duration;

use courier_delivery::CacheConfig;
use courier_settings::CourierSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the courier HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// WebSocket upgrade route.
    pub ws_path: String,
    /// Long-poll route (GET parks, POST delivers inbound frames).
    pub long_poll_path: String,
    /// Max inbound WebSocket message or POST body size in bytes.
    pub max_message_size: usize,
    /// Frames buffered per socket before pushes start failing.
    pub outbound_buffer: usize,
    /// Sweep period and poll parking limit.
    pub ctx_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ws_path: "/ws/panel".into(),
            long_poll_path: "/longpoll/panel".into(),
            max_message_size: 1024 * 1024,
            outbound_buffer: 1024,
            ctx_timeout_ms: 20_000,
        }
    }
}

impl ServerConfig {
    /// Server half of loaded settings.
    pub fn from_settings(settings: &CourierSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            ws_path: server.ws_path.clone(),
            long_poll_path: server.long_poll_path.clone(),
            max_message_size: server.max_message_size,
            outbound_buffer: server.outbound_buffer.max(1),
            ctx_timeout_ms: settings.delivery.ctx_timeout_ms,
        }
    }

    /// `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// How long a long-poll request may stay parked before the handler
    /// answers it itself. Twice the sweep period, so the sweep normally wins.
    pub fn poll_safety_timeout(&self) -> Duration {
        Duration::from_millis(self.ctx_timeout_ms.saturating_mul(2).max(1))
    }
}

/// Delivery half of loaded settings.
pub fn cache_config(settings: &CourierSettings) -> CacheConfig {
    let delivery = &settings.delivery;
    CacheConfig::new(
        delivery.ctx_timeout(),
        delivery.strong_timeout(),
        delivery.soft_timeout(),
    )
    .with_idle_grace_factor(delivery.idle_grace_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.ws_path, "/ws/panel");
        assert_eq!(cfg.poll_safety_timeout(), Duration::from_secs(40));
    }

    #[test]
    fn from_settings_copies_server_section() {
        let mut settings = CourierSettings::default();
        settings.server.port = 8080;
        settings.server.ws_path = "/ws".into();
        settings.server.outbound_buffer = 0;
        settings.delivery.ctx_timeout_ms = 500;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.ws_path, "/ws");
        assert_eq!(cfg.outbound_buffer, 1);
        assert_eq!(cfg.bind_address(), "127.0.0.1:8080");
        assert_eq!(cfg.poll_safety_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn cache_config_from_settings() {
        let mut settings = CourierSettings::default();
        settings.delivery.idle_grace_factor = 5;
        let cfg = cache_config(&settings);
        assert_eq!(cfg.ctx_timeout, Duration::from_secs(20));
        assert_eq!(cfg.strong_timeout, Duration::from_secs(5));
        assert_eq!(cfg.soft_timeout, Duration::from_secs(30));
        assert_eq!(cfg.idle_grace(), Duration::from_secs(100));
    }
}
