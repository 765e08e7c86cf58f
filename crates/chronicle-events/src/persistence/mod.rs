//! Persistence backends for the event log.
//!
//! A backend stores each appended event once, in append order, plus a single
//! sidecar document holding non-event state (configuration history and
//! conversation identity). The sidecar is opaque JSON at this layer; its
//! schema belongs to the runtime crate.
//!
//! Backends are consulted while the conversation lock is held, so they are
//! synchronous and never retried here: a failed write surfaces to the caller.

mod file;
mod memory;

pub use file::{BASE_STATE_FILE, FilePersistence, event_file_name};
pub use memory::InMemoryPersistence;

use chronicle_core::events::Event;
use serde_json::Value;

use crate::errors::Result;

/// Durable storage for one conversation's events and sidecar.
pub trait EventPersistence: Send + Sync {
    /// Store an event appended at `sequence` (its position in the log).
    fn persist_event(&self, sequence: usize, event: &Event) -> Result<()>;

    /// Load every stored event in append order.
    fn load_events(&self) -> Result<Vec<Event>>;

    /// Replace the sidecar document.
    fn write_base_state(&self, state: &Value) -> Result<()>;

    /// Read the sidecar document, if one was written.
    fn read_base_state(&self) -> Result<Option<Value>>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
