//! Indexed append-only event log.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_core::events::Event;
use chronicle_core::ids::EventId;
use tracing::trace;

use crate::errors::{EventStoreError, Result};

/// Direction of a paged read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageOrder {
    /// Oldest first.
    #[default]
    Chronological,
    /// Newest first.
    ReverseChronological,
}

/// One page of events.
#[derive(Clone, Debug)]
pub struct Page {
    /// Events in the requested order.
    pub events: Vec<Arc<Event>>,
    /// Id to pass as the cursor of the next call. `None` once the log is
    /// exhausted in the requested direction.
    pub next_cursor: Option<EventId>,
}

/// Ordered, append-only sequence of immutable events with an id index.
///
/// Events are stored behind [`Arc`] so views and subscribers can hold them
/// without copying. Nothing is ever removed: compaction is expressed as
/// further events.
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Arc<Event>>,
    index: HashMap<EventId, usize>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from events in append order.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Result<Self> {
        let mut store = Self::new();
        for event in events {
            let _ = store.append(event)?;
        }
        Ok(store)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Append an event and return its position.
    ///
    /// An event with an empty id is given a fresh one. Re-appending an id
    /// already in the log is rejected.
    pub fn append(&mut self, mut event: Event) -> Result<usize> {
        if event.id.is_empty() {
            event.id = EventId::new();
        }
        if self.index.contains_key(event.id.as_str()) {
            return Err(EventStoreError::DuplicateEvent(event.id.into_inner()));
        }

        let position = self.events.len();
        trace!(
            event_id = %event.id,
            kind = event.kind_name(),
            position,
            "event appended"
        );
        let _ = self.index.insert(event.id.clone(), position);
        self.events.push(Arc::new(event));
        Ok(position)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Look up an event by id.
    pub fn get(&self, id: &str) -> Result<&Arc<Event>> {
        self.try_get(id)
            .ok_or_else(|| EventStoreError::EventNotFound(id.to_string()))
    }

    /// Look up an event by id, returning `None` when absent.
    pub fn try_get(&self, id: &str) -> Option<&Arc<Event>> {
        self.position(id).and_then(|pos| self.events.get(pos))
    }

    /// Position of an event in append order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether an event with this id has been appended.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Event at a position.
    pub fn at(&self, position: usize) -> Option<&Arc<Event>> {
        self.events.get(position)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recently appended event.
    pub fn last(&self) -> Option<&Arc<Event>> {
        self.events.last()
    }

    /// All events in append order.
    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Event>> {
        self.events.iter()
    }

    /// Iterate newest first.
    pub fn iter_rev(&self) -> std::iter::Rev<std::slice::Iter<'_, Arc<Event>>> {
        self.events.iter().rev()
    }

    /// Events from `position` to the end.
    pub fn since(&self, position: usize) -> &[Arc<Event>] {
        self.events.get(position..).unwrap_or_default()
    }

    /// The last `n` events in append order.
    pub fn tail(&self, n: usize) -> &[Arc<Event>] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Read up to `limit` events after `cursor` in the given order.
    ///
    /// The cursor is the id of the last event of the previous page; `None`
    /// starts from the oldest (chronological) or newest (reverse) event.
    /// Cost is proportional to `limit`, not to the log length.
    pub fn page(&self, cursor: Option<&str>, limit: usize, order: PageOrder) -> Result<Page> {
        let cursor_pos = cursor
            .map(|id| {
                self.position(id)
                    .ok_or_else(|| EventStoreError::EventNotFound(id.to_string()))
            })
            .transpose()?;

        let (events, has_more) = match order {
            PageOrder::Chronological => {
                let len = self.events.len();
                let start = cursor_pos.map_or(0, |p| p + 1).min(len);
                let end = start.saturating_add(limit).min(len);
                (self.events[start..end].to_vec(), end < len)
            }
            PageOrder::ReverseChronological => {
                let end = cursor_pos.unwrap_or(self.events.len());
                let start = end.saturating_sub(limit);
                let events: Vec<_> = self.events[start..end].iter().rev().cloned().collect();
                (events, start > 0)
            }
        };

        let next_cursor = if has_more && !events.is_empty() {
            events.last().map(|e| e.id.clone())
        } else {
            None
        };
        Ok(Page {
            events,
            next_cursor,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
