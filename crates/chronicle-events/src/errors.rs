//! Error types for the event store subsystem.
//!
//! [`EventStoreError`] is the primary error type returned by all event store
//! and persistence operations. Every variant is fatal to the operation that
//! produced it and is surfaced to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Requested event was not found.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// An event with this id is already in the store.
    #[error("duplicate event id: {0}")]
    DuplicateEvent(String),

    /// Filesystem error from a persistence backend.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A persisted event file could not be decoded.
    #[error("corrupt event file {}: {message}", path.display())]
    CorruptEventFile {
        /// File that failed to decode.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// Invalid operation on the event store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_not_found_display() {
        let err = EventStoreError::EventNotFound("evt-456".into());
        assert_eq!(err.to_string(), "event not found: evt-456");
    }

    #[test]
    fn duplicate_event_display() {
        let err = EventStoreError::DuplicateEvent("evt-1".into());
        assert_eq!(err.to_string(), "duplicate event id: evt-1");
    }

    #[test]
    fn corrupt_file_display_names_path() {
        let err = EventStoreError::CorruptEventFile {
            path: PathBuf::from("/tmp/convo/event-00003-x.json"),
            message: "EOF while parsing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("event-00003-x.json"));
        assert!(msg.contains("EOF while parsing"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: EventStoreError = serde_err.into();
        assert!(matches!(err, EventStoreError::Serde(_)));
    }

    #[test]
    fn from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EventStoreError = io.into();
        assert!(err.to_string().contains("denied"));
    }
}
