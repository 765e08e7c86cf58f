//! The conversation event model.
//!
//! An [`Event`] is immutable once created: a stable id, a timestamp, its
//! [`EventSource`], and an [`EventKind`] drawn from a closed tagged union.
//!
//! | Kind | Produced by | Visible to the reasoning engine |
//! |------|-------------|---------------------------------|
//! | `system_prompt` | control loop | yes |
//! | `message` | user / agent | yes |
//! | `action` | agent (one per tool call) | yes |
//! | `observation` | tool executor (success) | yes |
//! | `agent_error` | tool executor / recovery (failure, interrupted) | yes |
//! | `condensation` | condenser | no (consumed by the view) |
//! | `condensation_request` | user / agent | no |
//! | `condensation_summary` | view only, never stored | yes |
//!
//! Observations and agent errors are the two variants of the
//! "observation base" family; [`Event::observation_base`] gives uniform
//! access to the fields they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ReasoningBlock;
use crate::ids::{BatchId, EventId, ToolCallId};
use crate::payload::ToolPayload;

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// The human (or client) driving the conversation.
    User,
    /// The agent / reasoning engine.
    Agent,
    /// Tool execution and the runtime itself.
    Environment,
}

/// A single immutable conversation event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique, stable event id. The store assigns one on append if empty.
    pub id: EventId,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Producer of the event.
    pub source: EventSource,
    /// Kind-specific body.
    pub kind: EventKind,
}

/// Closed set of event kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Initial system turn, recording the tools the conversation was created with.
    SystemPrompt(SystemPromptEvent),
    /// A user or agent text turn.
    Message(MessageEvent),
    /// One tool call issued by the agent.
    Action(ActionEvent),
    /// Successful tool result.
    Observation(ObservationEvent),
    /// Failed or interrupted tool result.
    AgentError(AgentErrorEvent),
    /// Compaction directive consumed by the view.
    Condensation(Condensation),
    /// Explicit request to compact immediately.
    CondensationRequest(CondensationRequest),
    /// Synthetic summary spliced into a view. Never appended to a store.
    CondensationSummary(CondensationSummary),
}

// ─────────────────────────────────────────────────────────────────────────────
// Kind bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Tool definition as advertised to the reasoning engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name (unique within a conversation).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolSpec {
    /// Create a tool spec with an empty parameter schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Value::Null,
        }
    }
}

/// Body of a `system_prompt` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemPromptEvent {
    /// System prompt text.
    pub prompt: String,
    /// Tools available to the conversation. Fixed for its lifetime.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// Role of a message turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human turn.
    User,
    /// Agent turn.
    Agent,
}

/// Body of a `message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Speaker.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Issuing turn, when the message came from the same response as a batch of actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
}

/// Body of an `action` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Issuing-turn id, shared by every action of one response.
    pub batch_id: BatchId,
    /// Tool call id, unique among pending calls.
    pub tool_call_id: ToolCallId,
    /// Name of the tool invoked.
    pub tool_name: String,
    /// Reasoning content emitted with this call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_blocks: Vec<ReasoningBlock>,
    /// Tool-specific payload.
    pub payload: ToolPayload,
}

/// Body of an `observation` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationEvent {
    /// Tool call this result resolves.
    pub tool_call_id: ToolCallId,
    /// Id of the originating action event.
    pub action_id: EventId,
    /// Name of the tool that produced it.
    pub tool_name: String,
    /// Result text.
    pub content: String,
}

/// Body of an `agent_error` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorEvent {
    /// Tool call this result resolves.
    pub tool_call_id: ToolCallId,
    /// Id of the originating action event.
    pub action_id: EventId,
    /// Name of the tool that failed.
    pub tool_name: String,
    /// Error text.
    pub error: String,
    /// Whether the call was cut short by an interrupt or crash rather than failing.
    #[serde(default)]
    pub interrupted: bool,
}

/// Body of a `condensation` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Condensation {
    /// Events hidden from every later view.
    pub forgotten_event_ids: Vec<EventId>,
    /// Summary standing in for the forgotten events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Visible-event count after which the summary is spliced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_offset: Option<usize>,
    /// Reasoning-engine turn that produced this directive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_turn_id: Option<BatchId>,
}

/// Body of a `condensation_request` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CondensationRequest {
    /// Why compaction was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of the synthetic `condensation_summary` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CondensationSummary {
    /// Summary text.
    pub summary: String,
}

/// Borrowed view of the fields shared by observations and agent errors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationBase<'a> {
    /// Tool call resolved.
    pub tool_call_id: &'a ToolCallId,
    /// Originating action event.
    pub action_id: &'a EventId,
    /// `true` for [`ObservationEvent`], `false` for [`AgentErrorEvent`].
    pub is_success: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Constructors
// ─────────────────────────────────────────────────────────────────────────────

impl Event {
    /// Create an event with a fresh id and the current time.
    #[must_use]
    pub fn new(source: EventSource, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            source,
            kind,
        }
    }

    /// Initial system turn.
    #[must_use]
    pub fn system_prompt(prompt: impl Into<String>, tools: Vec<ToolSpec>) -> Self {
        Self::new(
            EventSource::Agent,
            EventKind::SystemPrompt(SystemPromptEvent {
                prompt: prompt.into(),
                tools,
            }),
        )
    }

    /// User text turn.
    #[must_use]
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::new(
            EventSource::User,
            EventKind::Message(MessageEvent {
                role: Role::User,
                content: content.into(),
                batch_id: None,
            }),
        )
    }

    /// Agent text turn.
    #[must_use]
    pub fn agent_message(content: impl Into<String>, batch_id: Option<BatchId>) -> Self {
        Self::new(
            EventSource::Agent,
            EventKind::Message(MessageEvent {
                role: Role::Agent,
                content: content.into(),
                batch_id,
            }),
        )
    }

    /// One tool call of a batch.
    #[must_use]
    pub fn action(
        batch_id: BatchId,
        tool_call_id: ToolCallId,
        tool_name: impl Into<String>,
        payload: ToolPayload,
    ) -> Self {
        Self::new(
            EventSource::Agent,
            EventKind::Action(ActionEvent {
                batch_id,
                tool_call_id,
                tool_name: tool_name.into(),
                reasoning_blocks: Vec::new(),
                payload,
            }),
        )
    }

    /// Attach reasoning blocks to an action. No-op for other kinds.
    #[must_use]
    pub fn with_reasoning(mut self, blocks: Vec<ReasoningBlock>) -> Self {
        if let EventKind::Action(action) = &mut self.kind {
            action.reasoning_blocks = blocks;
        }
        self
    }

    /// Successful result for `action`.
    #[must_use]
    pub fn observation_for(action: &Event, content: impl Into<String>) -> Option<Self> {
        let call = action.as_action()?;
        Some(Self::new(
            EventSource::Environment,
            EventKind::Observation(ObservationEvent {
                tool_call_id: call.tool_call_id.clone(),
                action_id: action.id.clone(),
                tool_name: call.tool_name.clone(),
                content: content.into(),
            }),
        ))
    }

    /// Failed or interrupted result for `action`.
    #[must_use]
    pub fn agent_error_for(action: &Event, error: impl Into<String>, interrupted: bool) -> Option<Self> {
        let call = action.as_action()?;
        Some(Self::new(
            EventSource::Environment,
            EventKind::AgentError(AgentErrorEvent {
                tool_call_id: call.tool_call_id.clone(),
                action_id: action.id.clone(),
                tool_name: call.tool_name.clone(),
                error: error.into(),
                interrupted,
            }),
        ))
    }

    /// Compaction directive.
    #[must_use]
    pub fn condensation(condensation: Condensation) -> Self {
        Self::new(EventSource::Environment, EventKind::Condensation(condensation))
    }

    /// Explicit compaction request.
    #[must_use]
    pub fn condensation_request(reason: Option<String>) -> Self {
        Self::new(
            EventSource::User,
            EventKind::CondensationRequest(CondensationRequest { reason }),
        )
    }

    /// Synthetic summary for a view.
    #[must_use]
    pub fn condensation_summary(summary: impl Into<String>) -> Self {
        Self::new(
            EventSource::Environment,
            EventKind::CondensationSummary(CondensationSummary {
                summary: summary.into(),
            }),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accessors
// ─────────────────────────────────────────────────────────────────────────────

impl Event {
    /// Snake-case kind tag, matching the serialized `type` field.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EventKind::SystemPrompt(_) => "system_prompt",
            EventKind::Message(_) => "message",
            EventKind::Action(_) => "action",
            EventKind::Observation(_) => "observation",
            EventKind::AgentError(_) => "agent_error",
            EventKind::Condensation(_) => "condensation",
            EventKind::CondensationRequest(_) => "condensation_request",
            EventKind::CondensationSummary(_) => "condensation_summary",
        }
    }

    /// Action body, if this is an action.
    #[must_use]
    pub fn as_action(&self) -> Option<&ActionEvent> {
        match &self.kind {
            EventKind::Action(a) => Some(a),
            _ => None,
        }
    }

    /// Message body, if this is a message.
    #[must_use]
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match &self.kind {
            EventKind::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Condensation body, if this is a condensation.
    #[must_use]
    pub fn as_condensation(&self) -> Option<&Condensation> {
        match &self.kind {
            EventKind::Condensation(c) => Some(c),
            _ => None,
        }
    }

    /// System prompt body, if this is the system turn.
    #[must_use]
    pub fn as_system_prompt(&self) -> Option<&SystemPromptEvent> {
        match &self.kind {
            EventKind::SystemPrompt(s) => Some(s),
            _ => None,
        }
    }

    /// Shared fields of observations and agent errors.
    #[must_use]
    pub fn observation_base(&self) -> Option<ObservationBase<'_>> {
        match &self.kind {
            EventKind::Observation(o) => Some(ObservationBase {
                tool_call_id: &o.tool_call_id,
                action_id: &o.action_id,
                is_success: true,
            }),
            EventKind::AgentError(e) => Some(ObservationBase {
                tool_call_id: &e.tool_call_id,
                action_id: &e.action_id,
                is_success: false,
            }),
            _ => None,
        }
    }

    /// Batch id of an action, or of a message issued alongside one.
    #[must_use]
    pub fn batch_id(&self) -> Option<&BatchId> {
        match &self.kind {
            EventKind::Action(a) => Some(&a.batch_id),
            EventKind::Message(m) => m.batch_id.as_ref(),
            _ => None,
        }
    }

    /// Tool call id carried by actions, observations and agent errors.
    #[must_use]
    pub fn tool_call_id(&self) -> Option<&ToolCallId> {
        match &self.kind {
            EventKind::Action(a) => Some(&a.tool_call_id),
            EventKind::Observation(o) => Some(&o.tool_call_id),
            EventKind::AgentError(e) => Some(&e.tool_call_id),
            _ => None,
        }
    }

    /// Whether this event carries any reasoning block.
    #[must_use]
    pub fn has_reasoning(&self) -> bool {
        self.as_action()
            .is_some_and(|a| !a.reasoning_blocks.is_empty())
    }

    /// Whether the event is rendered into wire messages (as opposed to a
    /// control directive consumed by the engine).
    #[must_use]
    pub fn is_llm_convertible(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::Condensation(_) | EventKind::CondensationRequest(_)
        )
    }

    /// Plain-text rendering used for summarization prompts and token estimates.
    #[must_use]
    pub fn to_text(&self) -> String {
        match &self.kind {
            EventKind::SystemPrompt(s) => format!("[system] {}", s.prompt),
            EventKind::Message(m) => match m.role {
                Role::User => format!("[user] {}", m.content),
                Role::Agent => format!("[agent] {}", m.content),
            },
            EventKind::Action(a) => format!(
                "[action {} {}] {}",
                a.tool_name,
                a.tool_call_id,
                a.payload.to_text()
            ),
            EventKind::Observation(o) => {
                format!("[result {} {}] {}", o.tool_name, o.tool_call_id, o.content)
            }
            EventKind::AgentError(e) => {
                format!("[error {} {}] {}", e.tool_name, e.tool_call_id, e.error)
            }
            EventKind::Condensation(c) => format!(
                "[condensation] forgot {} events",
                c.forgotten_event_ids.len()
            ),
            EventKind::CondensationRequest(_) => "[condensation request]".to_owned(),
            EventKind::CondensationSummary(s) => format!("[summary] {}", s.summary),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
