//! # chronicle-context
//!
//! Projection of the event log into what the reasoning engine sees.
//!
//! - **Batching model**: view properties (batch atomicity, reasoning tail,
//!   tool-call matching) that decide which events may be forgotten and where
//!   the sequence may be cut
//! - **View**: the condensed, deduplicated, invariant-preserving projection
//! - **Condenser**: rolling summarization when the view outgrows its budget
//! - **Compliance monitor**: advisory streaming check of wire-protocol order
//! - **Wire**: flattening a view into provider-neutral messages

#![deny(unsafe_code)]

pub mod batching;
pub mod compliance;
pub mod condenser;
pub mod constants;
pub mod errors;
pub mod summarizer;
pub mod view;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use batching::{
    BatchAtomicity, BatchingModel, ReasoningTail, ToolCallMatching, ViewProperty,
};
pub use compliance::{
    AnyOrder, ComplianceMonitor, ComplianceViolation, IssueOrder, ResultOrderPolicy,
    ViolationKind, policy_for,
};
pub use condenser::{CondensationTrigger, Condenser, ForgottenRange};
pub use errors::{ContextError, Result};
pub use summarizer::{ModelClient, PromptSummarizer, Summarizer, SummarizerError, SummaryRequest};
pub use view::View;
pub use wire::{WireMessage, WireRole, WireToolCall, to_wire_messages};
