//! # chronicle-events
//!
//! Append-only event log for the chronicle memory engine.
//!
//! - **Event store**: ordered, id-indexed log of immutable events with O(1)
//!   lookup, `tail`, and cursor-resumed pagination in either direction
//! - **Persistence**: pluggable backends behind [`EventPersistence`]; an
//!   in-memory backend and a file-per-event backend with a `base_state.json`
//!   sidecar for non-event state
//!
//! Compaction never deletes from the store. It appends a condensation
//! directive that the view layer consumes.

#![deny(unsafe_code)]

pub mod errors;
pub mod persistence;
pub mod store;

pub use errors::{EventStoreError, Result};
pub use persistence::{BASE_STATE_FILE, EventPersistence, FilePersistence, InMemoryPersistence};
pub use store::{EventStore, Page, PageOrder};
