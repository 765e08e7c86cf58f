//! Projection of the event log into the sequence sent to the model.
//!
//! [`View::from_events`] is a pure function of the log:
//!
//! 1. The latest [`Condensation`](chronicle_core::events::Condensation) wins
//!    and its forgotten ids are dropped.
//! 2. Control events (condensations, condensation requests) are dropped.
//! 3. Results are deduplicated per tool call id, preferring a successful
//!    observation over an agent error.
//! 4. The [`BatchingModel`] removes anything left structurally invalid.
//! 5. The summary is spliced in as a synthetic
//!    [`EventKind::CondensationSummary`] event after `summary_offset` of the
//!    remaining events.
//!
//! The view also carries the legal cut boundaries and whether a condensation
//! request is still waiting to be served.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chronicle_core::events::{CondensationSummary, Event, EventKind, EventSource};
use chronicle_core::ids::{BatchId, EventId, ToolCallId};
use chronicle_core::tokens::estimate_events_tokens;
use tracing::debug;

use crate::batching::BatchingModel;

/// Visible, invariant-respecting event sequence.
#[derive(Clone, Debug, Default)]
pub struct View {
    events: Vec<Arc<Event>>,
    manipulation_indices: BTreeSet<usize>,
    unhandled_condensation_request: bool,
    forgotten_event_ids: Vec<EventId>,
    summary: Option<String>,
}

impl View {
    /// Project `all` (the full log, in append order) with the standard
    /// batching model.
    pub fn from_events(all: &[Arc<Event>]) -> Self {
        Self::from_events_with(all, &BatchingModel::standard())
    }

    /// Project `all` with an explicit batching model.
    pub fn from_events_with(all: &[Arc<Event>], model: &BatchingModel) -> Self {
        let latest = all
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, e)| e.as_condensation().map(|c| (pos, e, c)));

        let unhandled_condensation_request = all
            .iter()
            .skip(latest.map_or(0, |(pos, _, _)| pos + 1))
            .any(|e| matches!(e.kind, EventKind::CondensationRequest(_)));

        let forgotten: HashSet<&EventId> = latest
            .map(|(_, _, c)| c.forgotten_event_ids.iter().collect())
            .unwrap_or_default();

        let events: Vec<Arc<Event>> = all
            .iter()
            .filter(|e| e.is_llm_convertible() && !forgotten.contains(&e.id))
            .cloned()
            .collect();

        let events = dedupe_results(events);
        let removed = model.enforce(&events, all);
        let mut events: Vec<Arc<Event>> = events
            .into_iter()
            .filter(|e| !removed.contains(&e.id))
            .collect();

        let summary = latest.and_then(|(_, event, c)| {
            let text = c.summary.clone()?;
            let offset = c.summary_offset.unwrap_or(0).min(events.len());
            events.insert(offset, Arc::new(summary_event(event, &text)));
            Some(text)
        });
        let manipulation_indices = model.manipulation_indices(&events);

        debug!(
            total = all.len(),
            visible = events.len(),
            forgotten = forgotten.len(),
            enforced = removed.len(),
            unhandled_condensation_request,
            "view projected"
        );

        Self {
            events,
            manipulation_indices,
            unhandled_condensation_request,
            forgotten_event_ids: latest
                .map(|(_, _, c)| c.forgotten_event_ids.clone())
                .unwrap_or_default(),
            summary,
        }
    }

    /// Visible events in order.
    pub fn events(&self) -> &[Arc<Event>] {
        &self.events
    }

    /// Number of visible events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate visible events.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Event>> {
        self.events.iter()
    }

    /// Legal cut boundaries (see [`crate::batching`] for coordinates).
    pub fn manipulation_indices(&self) -> &BTreeSet<usize> {
        &self.manipulation_indices
    }

    /// Whether a condensation request arrived after the latest condensation.
    pub fn unhandled_condensation_request(&self) -> bool {
        self.unhandled_condensation_request
    }

    /// Ids forgotten by the latest condensation.
    pub fn forgotten_event_ids(&self) -> &[EventId] {
        &self.forgotten_event_ids
    }

    /// Text of the summary currently spliced into the view.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Batch id of the most recent visible batch.
    pub fn last_batch_id(&self) -> Option<&BatchId> {
        self.events.iter().rev().find_map(|e| e.batch_id())
    }

    /// Estimated tokens of the visible events.
    pub fn estimated_tokens(&self) -> u64 {
        estimate_events_tokens(self.events.iter().map(|e| &**e))
    }
}

/// Synthetic summary event. Its id derives from the condensation so
/// repeated projections agree on it.
fn summary_event(condensation_event: &Event, text: &str) -> Event {
    Event {
        id: EventId::from_string(format!("{}-summary", condensation_event.id)),
        timestamp: condensation_event.timestamp,
        source: EventSource::Environment,
        kind: EventKind::CondensationSummary(CondensationSummary {
            summary: text.to_string(),
        }),
    }
}

/// Keep exactly one result per tool call id.
///
/// The first successful observation wins; failing that, the first agent
/// error. The survivor stays at its own position.
fn dedupe_results(events: Vec<Arc<Event>>) -> Vec<Arc<Event>> {
    let mut winner: HashMap<&ToolCallId, (&EventId, bool)> = HashMap::new();
    for event in &events {
        let Some(base) = event.observation_base() else {
            continue;
        };
        let _ = winner
            .entry(base.tool_call_id)
            .and_modify(|current| {
                if !current.1 && base.is_success {
                    *current = (&event.id, true);
                }
            })
            .or_insert((&event.id, base.is_success));
    }

    let keep: HashSet<EventId> = winner.values().map(|(id, _)| (*id).clone()).collect();
    let before = events.len();
    let deduped: Vec<Arc<Event>> = events
        .iter()
        .filter(|e| e.observation_base().is_none() || keep.contains(&e.id))
        .cloned()
        .collect();
    if deduped.len() < before {
        debug!(dropped = before - deduped.len(), "duplicate tool results dropped");
    }
    deduped
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
