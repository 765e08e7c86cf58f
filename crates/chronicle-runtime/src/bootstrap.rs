//! Wiring from settings to a running conversation.

use std::sync::Arc;

use chronicle_context::{Condenser, Summarizer};
use chronicle_core::logging::{init_json_subscriber, init_subscriber};
use chronicle_events::{EventPersistence, FilePersistence};
use chronicle_settings::{ChronicleSettings, LoggingSettings};
use tracing::debug;

use crate::errors::Result;
use crate::state::ConversationState;
use crate::types::AgentConfig;

/// Install the process-wide subscriber described by `settings`.
pub fn init_logging(settings: &LoggingSettings) {
    if settings.json {
        init_json_subscriber(&settings.level);
    } else {
        init_subscriber(&settings.level);
    }
}

/// File backend for conversation `name`, if a persistence root is configured.
pub fn persistence_for(
    settings: &ChronicleSettings,
    name: &str,
) -> Result<Option<Arc<dyn EventPersistence>>> {
    let Some(root) = &settings.persistence.dir else {
        return Ok(None);
    };
    let backend = FilePersistence::open(root.join(name))?;
    debug!(dir = %backend.dir().display(), "file persistence selected");
    Ok(Some(Arc::new(backend)))
}

/// Open conversation `name`: restored from disk when persisted, otherwise
/// fresh and in memory.
pub fn open_conversation(
    settings: &ChronicleSettings,
    config: &AgentConfig,
    name: &str,
) -> Result<ConversationState> {
    match persistence_for(settings, name)? {
        Some(persistence) => ConversationState::open(config, &settings.compliance, persistence),
        None => Ok(ConversationState::new(config, &settings.compliance)),
    }
}

/// Condenser using `config`'s thresholds.
pub fn condenser_for(config: &AgentConfig, summarizer: Arc<dyn Summarizer>) -> Result<Condenser> {
    Ok(Condenser::new(&config.condenser, summarizer)?)
}
