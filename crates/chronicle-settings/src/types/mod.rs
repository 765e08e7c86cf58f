//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format. Each type implements [`Default`] with production default values
//! and is marked `#[serde(default)]`, so a partial file only overrides the
//! fields it names.

mod condenser;
mod runtime;

pub use condenser::*;
pub use runtime::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the memory engine.
///
/// # JSON Format
///
/// ```json
/// {
///   "condenser": { "maxSize": 80, "keepFirst": 2 },
///   "persistence": { "dir": "/var/lib/chronicle" },
///   "compliance": { "resultOrder": "issue" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChronicleSettings {
    /// Compaction policy.
    pub condenser: CondenserSettings,
    /// Where conversations are persisted.
    pub persistence: PersistenceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Protocol compliance monitoring.
    pub compliance: ComplianceSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_camel_case() {
        let json = serde_json::to_value(ChronicleSettings::default()).unwrap();
        assert_eq!(json["condenser"]["maxSize"], 120);
        assert_eq!(json["condenser"]["keepFirst"], 4);
        assert!(json["condenser"].get("maxTokens").is_none());
        assert_eq!(json["logging"]["level"], "warn");
        assert_eq!(json["compliance"]["resultOrder"], "any");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: ChronicleSettings =
            serde_json::from_str(r#"{"condenser": {"maxSize": 40}}"#).unwrap();
        assert_eq!(settings.condenser.max_size, 40);
        assert_eq!(settings.condenser.keep_first, 4);
        assert!(settings.persistence.dir.is_none());
    }
}
