//! Runtime error types.

use chronicle_context::ContextError;
use chronicle_core::payload::PayloadError;
use chronicle_events::EventStoreError;

/// Errors from conversation state operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Event store or persistence failure.
    #[error("store error: {0}")]
    Store(#[from] EventStoreError),

    /// Condenser configuration or condensation failure.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// The tool set differs from the one baked into the stored system prompt.
    #[error("tool set changed across restore (added: [{}] removed: [{}])", .added.join(", "), .removed.join(", "))]
    RestoreIncompatible {
        /// Tools configured now but absent from the stored conversation.
        added: Vec<String>,
        /// Tools in the stored conversation but no longer configured.
        removed: Vec<String>,
    },

    /// Persisted events exist but none is a system prompt.
    #[error("stored conversation has no system prompt")]
    MissingSystemPrompt,

    /// An action payload failed its registered schema.
    #[error("payload rejected: {0}")]
    Payload(#[from] PayloadError),

    /// The sidecar document could not be decoded.
    #[error("invalid base state: {0}")]
    BaseState(#[from] serde_json::Error),
}

impl StateError {
    /// Whether the conversation stays usable after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Context(_) | Self::Payload(_) => true,
            Self::Store(_)
            | Self::RestoreIncompatible { .. }
            | Self::MissingSystemPrompt
            | Self::BaseState(_) => false,
        }
    }

    /// Error category string for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Context(_) => "context",
            Self::RestoreIncompatible { .. } => "restore_incompatible",
            Self::MissingSystemPrompt => "missing_system_prompt",
            Self::Payload(_) => "payload",
            Self::BaseState(_) => "base_state",
        }
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, StateError>;
