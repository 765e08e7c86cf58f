//! Persistence, logging, and compliance settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where conversation directories live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Root directory for conversation directories. `None` keeps conversations in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Accepted ordering of parallel tool results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrder {
    /// Results of a batch may resolve in any order.
    #[default]
    Any,
    /// Results must resolve in the order their calls were issued.
    Issue,
}

/// Protocol compliance monitoring settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplianceSettings {
    /// Ordering rule for parallel tool results.
    pub result_order: ResultOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_order_lowercase() {
        let order: ResultOrder = serde_json::from_str("\"issue\"").unwrap();
        assert_eq!(order, ResultOrder::Issue);
        assert_eq!(serde_json::to_string(&ResultOrder::Any).unwrap(), "\"any\"");
    }

    #[test]
    fn persistence_dir_omitted_when_none() {
        let json = serde_json::to_value(PersistenceSettings::default()).unwrap();
        assert!(json.get("dir").is_none());
    }
}
