//! Context subsystem constants.

// =============================================================================
// Summaries
// =============================================================================

/// Prefix of the user message standing in for forgotten events.
pub const SUMMARY_PREFIX: &str = "[Summary of earlier conversation]";

/// Instructions sent ahead of the forgotten transcript.
pub const SUMMARY_PROMPT: &str = "You are maintaining the running memory of an agent \
conversation. Merge the previous summary (if any) with the events below into one \
concise summary. Keep the user's goals, decisions made, files and commands touched, \
and any unfinished work. Reply with the summary text only.";

// =============================================================================
// Summarizer
// =============================================================================

/// Truncation limit for a single event's text in the summarizer transcript.
pub const SUMMARIZER_EVENT_TEXT_LIMIT: usize = 2_000;

/// Maximum character length of the whole summarizer transcript.
pub const SUMMARIZER_MAX_TRANSCRIPT_CHARS: usize = 150_000;

/// Timeout for the summarization call (milliseconds).
pub const SUMMARIZER_TIMEOUT_MS: u64 = 60_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_ordered() {
        assert!(SUMMARIZER_EVENT_TEXT_LIMIT < SUMMARIZER_MAX_TRANSCRIPT_CHARS);
    }
}
