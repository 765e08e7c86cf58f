//! Context error types.

use thiserror::Error;

use crate::summarizer::SummarizerError;

/// Errors from view projection and condensation.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Condenser thresholds are inconsistent.
    #[error("invalid condenser configuration: {0}")]
    Configuration(String),

    /// The summarization call failed. The view is left uncondensed.
    #[error("condensation failed: {0}")]
    Summarization(#[from] SummarizerError),

    /// No legal range of events could be forgotten.
    #[error("nothing to condense")]
    NothingToCondense,
}

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
