//! Restore-time validation and sidecar handling.

use std::collections::BTreeSet;

use chronicle_core::events::{Event, SystemPromptEvent};
use chronicle_events::EventPersistence;

use crate::errors::{Result, StateError};
use crate::types::{AgentConfig, BaseState};

/// Check that `config` offers exactly the tools recorded in the first
/// system prompt of `events`.
///
/// An empty history has nothing to compare against and passes.
pub fn check_tool_compatibility(events: &[Event], config: &AgentConfig) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let recorded = events
        .iter()
        .find_map(Event::as_system_prompt)
        .ok_or(StateError::MissingSystemPrompt)?;
    check_tools(recorded, config)
}

/// Compare `config`'s tools with those advertised by `recorded`.
pub fn check_tools(recorded: &SystemPromptEvent, config: &AgentConfig) -> Result<()> {
    let stored: BTreeSet<&str> = recorded.tools.iter().map(|t| t.name.as_str()).collect();
    let current: BTreeSet<&str> = config.tools.iter().map(|t| t.name.as_str()).collect();

    let added: Vec<String> = current.difference(&stored).map(|s| (*s).to_string()).collect();
    let removed: Vec<String> = stored.difference(&current).map(|s| (*s).to_string()).collect();
    if added.is_empty() && removed.is_empty() {
        Ok(())
    } else {
        Err(StateError::RestoreIncompatible { added, removed })
    }
}

pub(crate) fn read_base_state(persistence: &dyn EventPersistence) -> Result<Option<BaseState>> {
    match persistence.read_base_state()? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub(crate) fn write_base_state(persistence: &dyn EventPersistence, state: &BaseState) -> Result<()> {
    persistence.write_base_state(&serde_json::to_value(state)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chronicle_core::events::ToolSpec;

    fn tools(names: &[&str]) -> Vec<ToolSpec> {
        names.iter().map(|n| ToolSpec::new(*n, "")).collect()
    }

    fn history(names: &[&str]) -> Vec<Event> {
        vec![
            Event::system_prompt("sys", tools(names)),
            Event::user_message("hi"),
        ]
    }

    #[test]
    fn same_tools_in_any_order_pass() {
        let config = AgentConfig::new("m").with_tools(tools(&["b", "a"]));
        assert!(check_tool_compatibility(&history(&["a", "b"]), &config).is_ok());
    }

    #[test]
    fn added_and_removed_tools_are_named() {
        let config = AgentConfig::new("m").with_tools(tools(&["a", "c"]));
        let err = check_tool_compatibility(&history(&["a", "b"]), &config).unwrap_err();
        assert_matches!(
            err,
            StateError::RestoreIncompatible { ref added, ref removed }
                if added == &["c"] && removed == &["b"]
        );
    }

    #[test]
    fn empty_history_passes() {
        let config = AgentConfig::new("m").with_tools(tools(&["a"]));
        assert!(check_tool_compatibility(&[], &config).is_ok());
    }

    #[test]
    fn history_without_system_prompt_fails() {
        let config = AgentConfig::new("m");
        let events = vec![Event::user_message("hi")];
        assert_matches!(
            check_tool_compatibility(&events, &config),
            Err(StateError::MissingSystemPrompt)
        );
    }
}
