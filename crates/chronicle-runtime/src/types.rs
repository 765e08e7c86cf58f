//! Runtime configuration and status types.

use chrono::{DateTime, Utc};
use chronicle_core::events::{Event, ToolSpec};
use chronicle_core::ids::ConversationId;
use chronicle_settings::CondenserSettings;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Agent configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration an agent attaches to a conversation with.
///
/// Everything except `tools` may change across a restore. The tool set is
/// baked into the schemas the conversation has already emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Reasoning engine model identifier.
    pub model: String,
    /// Condensation thresholds.
    #[serde(default)]
    pub condenser: CondenserSettings,
    /// Names of enabled skills.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Security policy label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
    /// Tools offered to the reasoning engine.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

impl AgentConfig {
    /// Create a config for `model` with default thresholds and no tools.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            condenser: CondenserSettings::default(),
            skills: Vec::new(),
            security_policy: None,
            tools: Vec::new(),
        }
    }

    /// Set the tool list.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the condenser thresholds.
    #[must_use]
    pub fn with_condenser(mut self, condenser: CondenserSettings) -> Self {
        self.condenser = condenser;
        self
    }

    /// Sorted tool names.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// The system prompt event advertising this config's tools.
    pub fn system_prompt(&self, prompt: impl Into<String>) -> Event {
        Event::system_prompt(prompt, self.tools.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sidecar
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the configuration history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// When this configuration was attached.
    pub recorded_at: DateTime<Utc>,
    /// The configuration.
    pub config: AgentConfig,
}

/// Non-event state stored alongside the event files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseState {
    /// Conversation identity.
    pub conversation_id: ConversationId,
    /// Every distinct configuration attached, oldest first.
    #[serde(default)]
    pub config_history: Vec<ConfigSnapshot>,
}

impl BaseState {
    /// Start a history with `config`.
    pub fn new(conversation_id: ConversationId, config: &AgentConfig) -> Self {
        Self {
            conversation_id,
            config_history: vec![ConfigSnapshot {
                recorded_at: Utc::now(),
                config: config.clone(),
            }],
        }
    }

    /// Most recently attached configuration.
    pub fn current(&self) -> Option<&AgentConfig> {
        self.config_history.last().map(|s| &s.config)
    }

    /// Append `config` unless it equals the latest entry. Returns whether
    /// the history grew.
    pub fn record(&mut self, config: &AgentConfig) -> bool {
        if self.current() == Some(config) {
            return false;
        }
        self.config_history.push(ConfigSnapshot {
            recorded_at: Utc::now(),
            config: config.clone(),
        });
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the control loop driving a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting for input.
    #[default]
    Idle,
    /// A model call or tool step is in progress.
    Running,
    /// Held by the user or a hook.
    Paused,
    /// The active model call was interrupted.
    Interrupted,
    /// The agent finished its task or was stopped.
    Finished,
    /// The loop failed.
    Error,
}

impl ExecutionStatus {
    /// Whether tool results arriving now should be recorded.
    pub fn accepts_results(self) -> bool {
        !matches!(self, Self::Interrupted | Self::Finished)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time counters for a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    /// Events in the store.
    pub events: usize,
    /// Events in the current view.
    pub visible: usize,
    /// Tool calls issued and not yet answered.
    pub pending_tool_calls: usize,
    /// Compliance violations recorded so far.
    pub violations: usize,
    /// Condensations recorded.
    pub condensations: usize,
    /// Estimated tokens of the current view.
    pub estimated_tokens: u64,
    /// Current execution status.
    pub status: ExecutionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::new("model-a").with_tools(vec![
            ToolSpec::new("terminal", "run commands"),
            ToolSpec::new("editor", "edit files"),
        ])
    }

    #[test]
    fn tool_names_are_sorted() {
        assert_eq!(config().tool_names(), vec!["editor", "terminal"]);
    }

    #[test]
    fn system_prompt_carries_tools() {
        let event = config().system_prompt("be helpful");
        let prompt = event.as_system_prompt().unwrap();
        assert_eq!(prompt.tools.len(), 2);
    }

    #[test]
    fn history_skips_unchanged_config() {
        let mut base = BaseState::new(ConversationId::new(), &config());
        assert!(!base.record(&config()));
        assert_eq!(base.config_history.len(), 1);

        let mut changed = config();
        changed.model = "model-b".into();
        assert!(base.record(&changed));
        assert_eq!(base.config_history.len(), 2);
        assert_eq!(base.current().unwrap().model, "model-b");
    }

    #[test]
    fn base_state_serializes_camel_case() {
        let base = BaseState::new(ConversationId::from_string("conv-1".into()), &config());
        let json = serde_json::to_value(&base).unwrap();
        assert_eq!(json["conversationId"], "conv-1");
        assert_eq!(json["configHistory"][0]["config"]["model"], "model-a");
        assert!(json["configHistory"][0]["recordedAt"].is_string());
        let back: BaseState = serde_json::from_value(json).unwrap();
        assert_eq!(back, base);
    }

    #[test]
    fn interrupted_status_rejects_results() {
        assert!(ExecutionStatus::Running.accepts_results());
        assert!(ExecutionStatus::Paused.accepts_results());
        assert!(!ExecutionStatus::Interrupted.accepts_results());
        assert!(!ExecutionStatus::Finished.accepts_results());
    }
}
