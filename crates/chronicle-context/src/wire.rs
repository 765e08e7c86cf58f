//! # Wire Message Flattening
//!
//! Converts a [`View`] into the ordered message list the reasoning engine
//! consumes.
//!
//! Key behaviors:
//! - System prompt → `system` message
//! - User message → `user` message
//! - Agent text, actions, and reasoning of one batch → a single `assistant`
//!   message carrying text, tool calls, and reasoning blocks
//! - Observations and tool errors → `tool` messages keyed by call id
//! - The condensation summary → a `user` message with [`SUMMARY_PREFIX`]

use chronicle_core::content::ReasoningBlock;
use chronicle_core::events::{Event, EventKind, Role};
use chronicle_core::ids::{BatchId, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SUMMARY_PREFIX;
use crate::view::View;

/// Speaker of a wire message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    /// System instructions.
    System,
    /// Human turn (and the summary stand-in).
    User,
    /// Model turn.
    Assistant,
    /// Tool result.
    Tool,
}

/// A tool call inside an assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireToolCall {
    /// Call id echoed by the matching tool message.
    pub id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Call arguments.
    pub arguments: Value,
}

/// One message of the flattened conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Speaker.
    pub role: WireRole,
    /// Text content (empty for a tool-calls-only assistant turn).
    pub content: String,
    /// Tool calls issued in this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    /// Reasoning blocks attached to this turn, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_blocks: Vec<ReasoningBlock>,
    /// Call answered by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
}

impl WireMessage {
    fn text(role: WireRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            reasoning_blocks: Vec::new(),
            tool_call_id: None,
        }
    }

    fn tool_result(call: &ToolCallId, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.clone()),
            ..Self::text(WireRole::Tool, content)
        }
    }
}

/// Flatten `view` into wire messages.
#[must_use]
pub fn to_wire_messages(view: &View) -> Vec<WireMessage> {
    let mut out: Vec<WireMessage> = Vec::with_capacity(view.len());
    // Batch of the assistant message at the end of `out`, if any.
    let mut open_batch: Option<BatchId> = None;

    for event in view.iter() {
        match &event.kind {
            EventKind::SystemPrompt(s) => {
                out.push(WireMessage::text(WireRole::System, s.prompt.clone()));
                open_batch = None;
            }
            EventKind::Message(m) if m.role == Role::User => {
                out.push(WireMessage::text(WireRole::User, m.content.clone()));
                open_batch = None;
            }
            EventKind::Message(m) => {
                let msg = assistant_slot(&mut out, &mut open_batch, m.batch_id.as_ref());
                if !msg.content.is_empty() {
                    msg.content.push('\n');
                }
                msg.content.push_str(&m.content);
            }
            EventKind::Action(a) => {
                let msg = assistant_slot(&mut out, &mut open_batch, Some(&a.batch_id));
                msg.reasoning_blocks
                    .extend(a.reasoning_blocks.iter().cloned());
                msg.tool_calls.push(WireToolCall {
                    id: a.tool_call_id.clone(),
                    name: a.tool_name.clone(),
                    arguments: a.payload.data.clone(),
                });
            }
            EventKind::Observation(o) => {
                out.push(WireMessage::tool_result(&o.tool_call_id, o.content.clone()));
                open_batch = None;
            }
            EventKind::AgentError(e) => {
                out.push(WireMessage::tool_result(&e.tool_call_id, e.error.clone()));
                open_batch = None;
            }
            EventKind::CondensationSummary(s) => {
                out.push(WireMessage::text(
                    WireRole::User,
                    format!("{SUMMARY_PREFIX}\n\n{}", s.summary),
                ));
                open_batch = None;
            }
            EventKind::Condensation(_) | EventKind::CondensationRequest(_) => {}
        }
    }
    out
}

/// The assistant message `batch` should land in, opening a new one unless
/// the last message already belongs to the same batch.
fn assistant_slot<'a>(
    out: &'a mut Vec<WireMessage>,
    open_batch: &mut Option<BatchId>,
    batch: Option<&BatchId>,
) -> &'a mut WireMessage {
    let reuse = batch.is_some() && open_batch.as_ref() == batch;
    if !reuse {
        out.push(WireMessage::text(WireRole::Assistant, String::new()));
        *open_batch = batch.cloned();
    }
    let last = out.len() - 1;
    &mut out[last]
}

/// Convenience for callers holding events rather than a view.
#[must_use]
pub fn events_to_wire_messages(events: &[std::sync::Arc<Event>]) -> Vec<WireMessage> {
    to_wire_messages(&View::from_events(events))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
