//! # chronicle-runtime
//!
//! Conversation state for the chronicle memory engine.
//!
//! - **ConversationState**: owns the event store behind a FIFO lock, runs the
//!   compliance monitor and persistence on every append, and delivers events
//!   to subscribers after the lock is released
//! - **Restore**: replays persisted events, rejects tool-set changes, and
//!   records every other configuration change in a history sidecar
//! - **Execution**: status lifecycle, interruptible model calls, and the
//!   safe-point check that drops results arriving after an interrupt
//! - **Blocking**: per-event block bookkeeping consulted by the control loop
//! - **Bootstrap**: settings to logging, persistence, and condenser

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod errors;
pub mod state;
pub mod types;

pub use bootstrap::{condenser_for, init_logging, open_conversation, persistence_for};
pub use errors::{Result, StateError};
pub use state::{ConversationState, EventCallback, SubscriptionId, check_tool_compatibility};
pub use types::{AgentConfig, BaseState, ConfigSnapshot, ConversationStats, ExecutionStatus};
