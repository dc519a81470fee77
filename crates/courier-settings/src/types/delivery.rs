//! Delivery core timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Timeouts handed to the client cache at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Silence after which a socket is pinged or a parked poll is released.
    /// Also the sweep period and the clock lock wait.
    pub ctx_timeout_ms: u64,
    /// Unconditional retention window for every message.
    pub strong_timeout_ms: u64,
    /// Hard retention ceiling. Widened to `strong + soft` when smaller than strong.
    pub soft_timeout_ms: u64,
    /// Detached clients with an empty backlog expire after this many ctx timeouts.
    pub idle_grace_factor: u32,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            ctx_timeout_ms: 20_000,
            strong_timeout_ms: 5_000,
            soft_timeout_ms: 30_000,
            idle_grace_factor: 3,
        }
    }
}

impl DeliverySettings {
    /// Ctx timeout as a [`Duration`].
    pub fn ctx_timeout(&self) -> Duration {
        Duration::from_millis(self.ctx_timeout_ms)
    }

    /// Strong retention as a [`Duration`].
    pub fn strong_timeout(&self) -> Duration {
        Duration::from_millis(self.strong_timeout_ms)
    }

    /// Soft retention as a [`Duration`].
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_millis(self.soft_timeout_ms)
    }

    /// Reject values the delivery core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ctx_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.ctxTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.idle_grace_factor == 0 {
            return Err(SettingsError::InvalidValue(
                "delivery.idleGraceFactor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_match_panel_handler() {
        let d = DeliverySettings::default();
        assert_eq!(d.ctx_timeout(), Duration::from_secs(20));
        assert_eq!(d.strong_timeout(), Duration::from_secs(5));
        assert_eq!(d.soft_timeout(), Duration::from_secs(30));
        assert_eq!(d.idle_grace_factor, 3);
    }

    #[test]
    fn defaults_validate() {
        assert!(DeliverySettings::default().validate().is_ok());
    }

    #[test]
    fn zero_ctx_timeout_rejected() {
        let d = DeliverySettings {
            ctx_timeout_ms: 0,
            ..DeliverySettings::default()
        };
        assert_matches!(d.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("ctxTimeoutMs"));
    }

    #[test]
    fn zero_grace_factor_rejected() {
        let d = DeliverySettings {
            idle_grace_factor: 0,
            ..DeliverySettings::default()
        };
        assert_matches!(d.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let d: DeliverySettings = serde_json::from_str(r#"{"softTimeoutMs": 1000}"#).unwrap();
        assert_eq!(d.soft_timeout_ms, 1_000);
        assert_eq!(d.ctx_timeout_ms, 20_000);
    }
}
