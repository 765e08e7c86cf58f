//! Compaction policy settings.

use serde::{Deserialize, Serialize};

/// Rolling-summary condenser thresholds.
///
/// These values are only shape-checked here. Consistency between them
/// (a positive tail after reserving the head and the summary slot) is
/// enforced when the condenser is constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CondenserSettings {
    /// Visible-event count above which the view is condensed.
    pub max_size: usize,
    /// Leading visible events always retained.
    pub keep_first: usize,
    /// Estimated-token budget above which the view is condensed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl Default for CondenserSettings {
    fn default() -> Self {
        Self {
            max_size: 120,
            keep_first: 4,
            max_tokens: None,
        }
    }
}
