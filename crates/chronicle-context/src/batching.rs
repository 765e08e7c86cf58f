//! Atomicity invariants over event sequences.
//!
//! A [`ViewProperty`] answers two questions about a sequence of events:
//!
//! - **enforce**: given the events a caller wants to keep out of a longer
//!   history, which ones must also go so the invariant holds?
//! - **manipulation indices**: at which boundaries may the sequence be cut
//!   without breaking the invariant?
//!
//! [`BatchingModel`] composes properties: removals are unioned (iterated to a
//! fixed point) and legal boundaries are intersected.
//!
//! ## Boundary coordinates
//!
//! For a sequence of `n` events, boundary `0` is the head, boundary `i` for
//! `1 <= i < n` sits between `events[i - 1]` and `events[i]`, and `n + 1` is
//! the tail. Boundary `n` is never reported. The empty sequence has only the
//! tail boundary (`{1}`); a single event has `{0, 2}`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chronicle_core::events::Event;
use chronicle_core::ids::{BatchId, EventId};
use tracing::trace;

// =============================================================================
// Boundaries
// =============================================================================

/// Every boundary of a sequence of `len` events.
pub fn all_boundaries(len: usize) -> BTreeSet<usize> {
    if len == 0 {
        return BTreeSet::from([1]);
    }
    let mut set: BTreeSet<usize> = (0..len).collect();
    let _ = set.insert(len + 1);
    set
}

/// Tail boundary of a sequence of `len` events.
pub fn tail_boundary(len: usize) -> usize {
    len + 1
}

/// Slice offset a boundary cuts at (`events[..offset]` lies before it).
pub fn boundary_offset(len: usize, boundary: usize) -> usize {
    boundary.min(len)
}

/// Drop every boundary strictly between `events[first]` and `events[last]`.
fn exclude_inside(set: &mut BTreeSet<usize>, first: usize, last: usize) {
    for boundary in (first + 1)..=last {
        let _ = set.remove(&boundary);
    }
}

/// Batches in order of first appearance, with their member positions.
fn batches(events: &[Arc<Event>]) -> Vec<(&BatchId, Vec<usize>)> {
    let mut order: Vec<(&BatchId, Vec<usize>)> = Vec::new();
    let mut slot: HashMap<&BatchId, usize> = HashMap::new();
    for (pos, event) in events.iter().enumerate() {
        let Some(batch) = event.batch_id() else {
            continue;
        };
        let idx = *slot.entry(batch).or_insert_with(|| {
            order.push((batch, Vec::new()));
            order.len() - 1
        });
        order[idx].1.push(pos);
    }
    order
}

/// Index (into `batches`) of the last batch carrying a reasoning block.
fn reasoning_anchor(events: &[Arc<Event>], batches: &[(&BatchId, Vec<usize>)]) -> Option<usize> {
    batches
        .iter()
        .rposition(|(_, members)| members.iter().any(|&pos| events[pos].has_reasoning()))
}

fn id_set(events: &[Arc<Event>]) -> HashSet<&EventId> {
    events.iter().map(|e| &e.id).collect()
}

// =============================================================================
// ViewProperty
// =============================================================================

/// One structural invariant a view must satisfy.
pub trait ViewProperty: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Ids that must be dropped from `kept` for the invariant to hold.
    ///
    /// `history` is the full sequence `kept` was selected from, and may
    /// include the control events of the log. The result may name ids that
    /// are not in `kept`; callers ignore those.
    fn enforce(&self, kept: &[Arc<Event>], history: &[Arc<Event>]) -> HashSet<EventId>;

    /// Boundaries of `events` at which a cut preserves the invariant.
    fn manipulation_indices(&self, events: &[Arc<Event>]) -> BTreeSet<usize>;
}

// =============================================================================
// Batch atomicity
// =============================================================================

/// All events sharing a batch id are kept or dropped together.
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchAtomicity;

impl ViewProperty for BatchAtomicity {
    fn name(&self) -> &'static str {
        "batch_atomicity"
    }

    fn enforce(&self, kept: &[Arc<Event>], history: &[Arc<Event>]) -> HashSet<EventId> {
        let kept_ids = id_set(kept);
        let mut remove = HashSet::new();
        for (batch, members) in batches(history) {
            let present = members
                .iter()
                .filter(|&&pos| kept_ids.contains(&history[pos].id))
                .count();
            if present > 0 && present < members.len() {
                trace!(batch_id = %batch, present, total = members.len(), "partial batch dropped");
                remove.extend(members.iter().map(|&pos| history[pos].id.clone()));
            }
        }
        remove
    }

    fn manipulation_indices(&self, events: &[Arc<Event>]) -> BTreeSet<usize> {
        let mut set = all_boundaries(events.len());
        for (_, members) in batches(events) {
            if let (Some(&first), Some(&last)) = (members.first(), members.last()) {
                exclude_inside(&mut set, first, last);
            }
        }
        set
    }
}

// =============================================================================
// Reasoning tail
// =============================================================================

/// The batches from the last reasoning-carrying batch to the end form one
/// unit.
///
/// Dropping the anchor batch drops every later batch. Dropping a later batch
/// never forces dropping the anchor or anything before it.
///
/// When `history` carries the condensation that forgot the anchor, only the
/// batches before that condensation are tied to it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReasoningTail;

impl ViewProperty for ReasoningTail {
    fn name(&self) -> &'static str {
        "reasoning_tail"
    }

    fn enforce(&self, kept: &[Arc<Event>], history: &[Arc<Event>]) -> HashSet<EventId> {
        let order = batches(history);
        let Some(anchor) = reasoning_anchor(history, &order) else {
            return HashSet::new();
        };
        let kept_ids = id_set(kept);
        let anchor_kept = order[anchor]
            .1
            .iter()
            .all(|&pos| kept_ids.contains(&history[pos].id));
        if anchor_kept {
            return HashSet::new();
        }

        // Batches appended after the condensation that forgot the anchor start
        // a fresh chain.
        let anchor_ids: HashSet<&EventId> = order[anchor]
            .1
            .iter()
            .map(|&pos| &history[pos].id)
            .collect();
        let after_anchor = order[anchor].1.last().map_or(0, |&pos| pos + 1);
        let horizon = history[after_anchor..]
            .iter()
            .position(|e| {
                e.as_condensation().is_some_and(|c| {
                    c.forgotten_event_ids.iter().any(|id| anchor_ids.contains(id))
                })
            })
            .map_or(history.len(), |offset| after_anchor + offset);

        let later: HashSet<&BatchId> = order[anchor + 1..]
            .iter()
            .filter(|(_, members)| members.first().is_some_and(|&pos| pos < horizon))
            .map(|(b, _)| *b)
            .collect();
        let remove: HashSet<EventId> = kept
            .iter()
            .filter(|e| e.batch_id().is_some_and(|b| later.contains(b)))
            .map(|e| e.id.clone())
            .collect();
        if !remove.is_empty() {
            trace!(
                anchor = %order[anchor].0,
                removed = remove.len(),
                "reasoning anchor forgotten, dropping later batches"
            );
        }
        remove
    }

    fn manipulation_indices(&self, events: &[Arc<Event>]) -> BTreeSet<usize> {
        let mut set = all_boundaries(events.len());
        let order = batches(events);
        if let Some(anchor) = reasoning_anchor(events, &order) {
            if let Some(&start) = order[anchor].1.first() {
                exclude_inside(&mut set, start, events.len() - 1);
            }
        }
        set
    }
}

// =============================================================================
// Tool call matching
// =============================================================================

/// An action and the result answering it are never separated by a cut, and a
/// result never outlives its action.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToolCallMatching;

impl ViewProperty for ToolCallMatching {
    fn name(&self) -> &'static str {
        "tool_call_matching"
    }

    fn enforce(&self, kept: &[Arc<Event>], history: &[Arc<Event>]) -> HashSet<EventId> {
        let kept_ids = id_set(kept);
        let history_ids = id_set(history);
        kept.iter()
            .filter(|e| {
                e.observation_base().is_some_and(|base| {
                    history_ids.contains(base.action_id) && !kept_ids.contains(base.action_id)
                })
            })
            .map(|e| e.id.clone())
            .collect()
    }

    fn manipulation_indices(&self, events: &[Arc<Event>]) -> BTreeSet<usize> {
        let mut set = all_boundaries(events.len());
        let positions: HashMap<&EventId, usize> =
            events.iter().enumerate().map(|(i, e)| (&e.id, i)).collect();
        for (pos, event) in events.iter().enumerate() {
            let Some(base) = event.observation_base() else {
                continue;
            };
            if let Some(&action_pos) = positions.get(base.action_id) {
                if action_pos < pos {
                    exclude_inside(&mut set, action_pos, pos);
                }
            }
        }
        set
    }
}

// =============================================================================
// BatchingModel
// =============================================================================

/// Composition of view properties.
pub struct BatchingModel {
    properties: Vec<Box<dyn ViewProperty>>,
}

impl Default for BatchingModel {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for BatchingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.property_names()).finish()
    }
}

impl BatchingModel {
    /// Compose an explicit list of properties.
    pub fn new(properties: Vec<Box<dyn ViewProperty>>) -> Self {
        Self { properties }
    }

    /// Batch atomicity, tool-call matching and the reasoning tail.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(BatchAtomicity),
            Box::new(ToolCallMatching),
            Box::new(ReasoningTail),
        ])
    }

    /// Names of the composed properties.
    pub fn property_names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    /// Ids to drop from `kept` so every property holds.
    ///
    /// Removal only tightens: an id once removed is never re-added, and
    /// properties are re-applied until no new removal appears.
    pub fn enforce(&self, kept: &[Arc<Event>], history: &[Arc<Event>]) -> HashSet<EventId> {
        let mut removed: HashSet<EventId> = HashSet::new();
        loop {
            let current: Vec<Arc<Event>> = kept
                .iter()
                .filter(|e| !removed.contains(&e.id))
                .cloned()
                .collect();
            let before = removed.len();
            for property in &self.properties {
                removed.extend(property.enforce(&current, history));
            }
            if removed.len() == before {
                return removed;
            }
        }
    }

    /// Boundaries legal under every property.
    pub fn manipulation_indices(&self, events: &[Arc<Event>]) -> BTreeSet<usize> {
        let mut properties = self.properties.iter();
        let Some(first) = properties.next() else {
            return all_boundaries(events.len());
        };
        let mut set = first.manipulation_indices(events);
        for property in properties {
            let other = property.manipulation_indices(events);
            set.retain(|b| other.contains(b));
        }
        set
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
