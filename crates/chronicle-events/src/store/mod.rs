//! In-memory `EventStore` API.
//!
//! The [`EventStore`] is the ordered, append-only log every other component
//! reads. Position lookups go through an id index, so `get`, `tail` and
//! cursor-resumed pagination never scan the log.

mod event_store;

pub use event_store::*;
