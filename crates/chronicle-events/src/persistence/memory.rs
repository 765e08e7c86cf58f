//! In-memory persistence backend.

use std::sync::Arc;

use chronicle_core::events::Event;
use parking_lot::Mutex;
use serde_json::Value;

use super::EventPersistence;
use crate::errors::{EventStoreError, Result};

#[derive(Debug, Default)]
struct Inner {
    events: Vec<Event>,
    base_state: Option<Value>,
}

/// Process-local backend.
///
/// Clones share the same storage, so a clone handed to a second
/// conversation behaves like reopening the same directory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPersistence {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryPersistence {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether no event has been stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}

impl EventPersistence for InMemoryPersistence {
    fn persist_event(&self, sequence: usize, event: &Event) -> Result<()> {
        let mut inner = self.inner.lock();
        if sequence != inner.events.len() {
            return Err(EventStoreError::InvalidOperation(format!(
                "out-of-order persist: sequence {sequence}, stored {}",
                inner.events.len()
            )));
        }
        inner.events.push(event.clone());
        Ok(())
    }

    fn load_events(&self) -> Result<Vec<Event>> {
        Ok(self.inner.lock().events.clone())
    }

    fn write_base_state(&self, state: &Value) -> Result<()> {
        self.inner.lock().base_state = Some(state.clone());
        Ok(())
    }

    fn read_base_state(&self) -> Result<Option<Value>> {
        Ok(self.inner.lock().base_state.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
