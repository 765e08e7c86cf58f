//! Token estimation.
//!
//! The engine never sees provider tokenizers. Budgets are enforced against a
//! character-based estimate (four characters per token, rounded up), which
//! errs towards compacting early rather than overflowing the context window.

use serde::{Deserialize, Serialize};

use crate::events::Event;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a string.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    u64::try_from(text.len().div_ceil(CHARS_PER_TOKEN)).unwrap_or(u64::MAX)
}

/// Estimate the token count of an event's rendered text.
#[must_use]
pub fn estimate_event_tokens(event: &Event) -> u64 {
    estimate_tokens(&event.to_text())
}

/// Estimate the token count of a sequence of events.
#[must_use]
pub fn estimate_events_tokens<'a>(events: impl IntoIterator<Item = &'a Event>) -> u64 {
    events.into_iter().map(estimate_event_tokens).sum()
}

/// Upper bound on the estimated tokens a view may occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Maximum estimated tokens.
    pub max_tokens: u64,
}

impl TokenBudget {
    /// Create a budget.
    #[must_use]
    pub fn new(max_tokens: u64) -> Self {
        Self { max_tokens }
    }

    /// Whether `tokens` exceeds the budget.
    #[must_use]
    pub fn is_exceeded_by(&self, tokens: u64) -> bool {
        tokens > self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn events_sum() {
        let a = Event::user_message("12345678");
        let b = Event::user_message("1234");
        let total = estimate_events_tokens([&a, &b]);
        assert_eq!(total, estimate_event_tokens(&a) + estimate_event_tokens(&b));
    }

    #[test]
    fn budget_is_strict_upper_bound() {
        let budget = TokenBudget::new(100);
        assert!(!budget.is_exceeded_by(100));
        assert!(budget.is_exceeded_by(101));
    }
}
