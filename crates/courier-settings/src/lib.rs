//! # courier-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CourierSettings::default()`]
//! 2. **Settings file**: `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `COURIER_*` overrides (highest priority)
//!
//! The delivery core never reads settings itself; the binary converts
//! [`DeliverySettings`] into constructor arguments.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
