//! Summarization of forgotten events.
//!
//! The condenser hands a [`Summarizer`] the events it is about to forget
//! together with the summary they replace, so each summary rolls the
//! previous one forward instead of growing without bound.
//!
//! [`PromptSummarizer`] is the production implementation: it renders a
//! transcript, wraps it in [`SUMMARY_PROMPT`], and asks a secondary model
//! through the [`ModelClient`] seam. Failures surface as
//! [`SummarizerError`]; there is no fallback summary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chronicle_core::events::Event;
use tracing::{debug, warn};

use crate::constants::{
    SUMMARIZER_EVENT_TEXT_LIMIT, SUMMARIZER_MAX_TRANSCRIPT_CHARS, SUMMARIZER_TIMEOUT_MS,
    SUMMARY_PROMPT,
};

// =============================================================================
// Traits
// =============================================================================

/// Input of one summarization call.
#[derive(Clone, Copy, Debug)]
pub struct SummaryRequest<'a> {
    /// Summary currently standing in for earlier forgotten events.
    pub previous_summary: Option<&'a str>,
    /// Events being forgotten, in order.
    pub forgotten: &'a [Arc<Event>],
}

impl SummaryRequest<'_> {
    /// Render the forgotten events as one line each, truncated.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for event in self.forgotten {
            let line = truncate(&event.to_text(), SUMMARIZER_EVENT_TEXT_LIMIT);
            if out.len() + line.len() + 1 > SUMMARIZER_MAX_TRANSCRIPT_CHARS {
                out.push_str("[... transcript truncated ...]\n");
                break;
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Full prompt sent to the model.
    pub fn prompt(&self) -> String {
        let previous = self.previous_summary.unwrap_or("(none)");
        format!(
            "{SUMMARY_PROMPT}\n\n<previous_summary>\n{previous}\n</previous_summary>\n\n<events>\n{}</events>",
            self.transcript()
        )
    }
}

/// Produces a summary for forgotten events.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `request`. The returned text replaces the previous summary.
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String, SummarizerError>;
}

/// Secondary model used for summarization.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete a single prompt.
    async fn complete(
        &self,
        prompt: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Errors that can occur during summarization.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// The model call timed out.
    #[error("summarizer timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The model call failed.
    #[error("summarizer call failed: {message}")]
    CallFailed {
        /// Error message.
        message: String,
    },

    /// The model returned no text.
    #[error("summarizer returned an empty summary")]
    EmptySummary,
}

// =============================================================================
// PromptSummarizer
// =============================================================================

/// Summarizer backed by a secondary model call.
pub struct PromptSummarizer<C: ModelClient> {
    client: C,
    timeout: Duration,
}

impl<C: ModelClient> PromptSummarizer<C> {
    /// Create a summarizer with the default timeout.
    pub fn new(client: C) -> Self {
        Self {
            client,
            timeout: Duration::from_millis(SUMMARIZER_TIMEOUT_MS),
        }
    }

    /// Override the call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<C: ModelClient> Summarizer for PromptSummarizer<C> {
    async fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String, SummarizerError> {
        let prompt = request.prompt();
        debug!(
            forgotten = request.forgotten.len(),
            has_previous = request.previous_summary.is_some(),
            prompt_chars = prompt.len(),
            "requesting summary"
        );

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let response = tokio::time::timeout(self.timeout, self.client.complete(&prompt))
            .await
            .map_err(|_| {
                warn!(timeout_ms, "summarizer timed out");
                SummarizerError::Timeout { timeout_ms }
            })?
            .map_err(|e| {
                warn!(error = %e, "summarizer call failed");
                SummarizerError::CallFailed {
                    message: e.to_string(),
                }
            })?;

        let summary = response.trim();
        if summary.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }
        Ok(summary.to_string())
    }
}

/// Truncate to at most `max_len` bytes on a char boundary, marking the cut.
fn truncate(s: &str, max_len: usize) -> String {
    const SUFFIX: &str = "...";
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(SUFFIX.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{SUFFIX}", &s[..end])
}

// =============================================================================
// Tests
// =============================================================================
