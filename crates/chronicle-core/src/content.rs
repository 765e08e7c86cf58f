//! Reasoning content blocks.
//!
//! Extended-reasoning fragments are opaque to the memory engine: they are
//! carried verbatim from the reasoning engine's response back into the wire
//! messages it is later fed. The only thing the engine inspects is whether a
//! turn carries any of them, because the downstream protocol constrains where
//! reasoning may appear.

use serde::{Deserialize, Serialize};

/// An opaque extended-reasoning fragment attached to an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReasoningBlock {
    /// Plain thinking content with an optional verification signature.
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Provider-redacted thinking (encrypted payload only).
    #[serde(rename = "redacted_thinking")]
    Redacted {
        /// Encrypted reasoning payload.
        data: String,
    },
}

impl ReasoningBlock {
    /// Create a thinking block without a signature.
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: text.into(),
            signature: None,
        }
    }

    /// Create a signed thinking block.
    #[must_use]
    pub fn signed(text: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: text.into(),
            signature: Some(signature.into()),
        }
    }

    /// Readable text of this block, if any. Redacted blocks have none.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Thinking { thinking, .. } => Some(thinking),
            Self::Redacted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_wire_shape() {
        let block = ReasoningBlock::signed("hmm", "sig");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "thinking");
        assert_eq!(json["thinking"], "hmm");
        assert_eq!(json["signature"], "sig");
    }

    #[test]
    fn unsigned_thinking_omits_signature() {
        let json = serde_json::to_value(ReasoningBlock::thinking("x")).unwrap();
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn redacted_has_no_text() {
        let block: ReasoningBlock =
            serde_json::from_str(r#"{"type":"redacted_thinking","data":"opaque"}"#).unwrap();
        assert_eq!(block.text(), None);
        assert_eq!(ReasoningBlock::thinking("visible").text(), Some("visible"));
    }
}
