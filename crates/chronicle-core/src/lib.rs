//! # chronicle-core
//!
//! Foundation types for the chronicle conversation memory engine.
//!
//! This crate provides the shared vocabulary every other chronicle crate
//! depends on:
//!
//! - **Branded IDs**: `EventId`, `ToolCallId`, `BatchId`, `ConversationId`
//! - **Events**: the closed `EventKind` union (messages, actions, results,
//!   compaction directives) wrapped in an immutable `Event` envelope
//! - **Reasoning blocks**: opaque extended-reasoning fragments
//! - **Tool payloads**: kind-tagged payload bodies and the `PayloadRegistry`
//! - **Tokens**: character-based token estimation and budgets
//! - **Cancellation**: the hierarchical `CancelToken` tree
//! - **Logging**: `tracing` subscriber bootstrap and test capture

#![deny(unsafe_code)]

pub mod cancel;
pub mod content;
pub mod events;
pub mod ids;
pub mod logging;
pub mod payload;
pub mod tokens;

pub use cancel::CancelToken;
pub use content::ReasoningBlock;
pub use events::{
    ActionEvent, AgentErrorEvent, Condensation, CondensationRequest, CondensationSummary, Event,
    EventKind, EventSource, MessageEvent, ObservationBase, ObservationEvent, Role,
    SystemPromptEvent, ToolSpec,
};
pub use ids::{BatchId, ConversationId, EventId, ToolCallId};
pub use payload::{PayloadError, PayloadRegistry, ToolPayload};
pub use tokens::{TokenBudget, estimate_event_tokens, estimate_events_tokens, estimate_tokens};
