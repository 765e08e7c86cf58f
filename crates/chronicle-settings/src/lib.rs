//! # chronicle-settings
//!
//! Configuration management with layered sources for the chronicle memory
//! engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChronicleSettings::default()`]
//! 2. **Settings file**: `~/.chronicle/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `CHRONICLE_*` overrides (highest priority)
//!
//! There is no global settings instance: callers load a
//! [`ChronicleSettings`] once and thread it into the constructors that need
//! it.
//!
//! # Usage
//!
//! ```no_run
//! use chronicle_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("condense above {} events", settings.condenser.max_size);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_file_layer, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = ChronicleSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".chronicle/settings.json"));
    }
}
