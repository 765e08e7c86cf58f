//! Rolling-summary condenser.
//!
//! Decides when the view has outgrown its budget and which events to forget.
//!
//! ## Algorithm
//!
//! 1. Keep the first `keep_first` visible events (the head).
//! 2. Aim for `target_size` visible events afterwards: `max_size / 2`, or
//!    `len / 2` when serving an explicit condensation request.
//! 3. Keep the last `tail_count = target_size - keep_first - 1` events; one
//!    slot is reserved for the summary.
//! 4. Forget what lies between, with both ends snapped forward to legal
//!    boundaries so no batch, tool call or reasoning tail is split.
//! 5. Summarize the forgotten events together with the previous summary.
//!
//! A failed summarization is returned as an error. The caller keeps the
//! oversized view rather than recording a fabricated summary.

use std::collections::HashSet;
use std::sync::Arc;

use chronicle_core::events::{Condensation, Event, EventKind};
use chronicle_core::ids::EventId;
use chronicle_core::tokens::TokenBudget;
use chronicle_settings::CondenserSettings;
use tracing::{debug, info};

use crate::batching::{BatchingModel, boundary_offset};
use crate::errors::{ContextError, Result};
use crate::summarizer::{Summarizer, SummaryRequest};
use crate::view::View;

/// Why a view should be condensed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CondensationTrigger {
    /// A condensation request has not been served yet.
    Requested,
    /// The estimated token count exceeds the budget.
    TokenBudget,
    /// The visible event count exceeds `max_size`.
    EventCount,
}

/// Events a condensation forgets, and how many visible events stay ahead of
/// the summary.
#[derive(Clone, Debug)]
pub struct ForgottenRange {
    /// Forgotten visible events, in order.
    pub events: Vec<Arc<Event>>,
    /// Kept head length, used as the condensation's `summary_offset`.
    pub summary_offset: usize,
}

/// Condensation policy bound to a summarizer.
pub struct Condenser {
    max_size: usize,
    keep_first: usize,
    token_budget: Option<TokenBudget>,
    summarizer: Arc<dyn Summarizer>,
    model: BatchingModel,
}

impl std::fmt::Debug for Condenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condenser")
            .field("max_size", &self.max_size)
            .field("keep_first", &self.keep_first)
            .field("token_budget", &self.token_budget)
            .finish_non_exhaustive()
    }
}

impl Condenser {
    /// Create a condenser, rejecting thresholds that leave no tail.
    pub fn new(settings: &CondenserSettings, summarizer: Arc<dyn Summarizer>) -> Result<Self> {
        let target = settings.max_size / 2;
        if target <= settings.keep_first + 1 {
            let tail = signed(target) - signed(settings.keep_first) - 1;
            return Err(ContextError::Configuration(format!(
                "tail_count = {}/2 - {} - 1 = {tail} must be positive",
                settings.max_size, settings.keep_first
            )));
        }
        Ok(Self {
            max_size: settings.max_size,
            keep_first: settings.keep_first,
            token_budget: settings.max_tokens.map(TokenBudget::new),
            summarizer,
            model: BatchingModel::standard(),
        })
    }

    /// Replace the batching model used to validate forgotten ranges.
    #[must_use]
    pub fn with_model(mut self, model: BatchingModel) -> Self {
        self.model = model;
        self
    }

    /// Visible-event threshold.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Leading events always retained.
    pub fn keep_first(&self) -> usize {
        self.keep_first
    }

    /// Tail kept by a size-triggered condensation.
    pub fn tail_count(&self) -> usize {
        self.tail_for(self.max_size / 2)
    }

    fn tail_for(&self, target: usize) -> usize {
        target.saturating_sub(self.keep_first + 1)
    }

    /// Why `view` needs condensing, if it does.
    ///
    /// `budget` overrides the configured token budget for this check.
    pub fn condensation_trigger(
        &self,
        view: &View,
        budget: Option<TokenBudget>,
    ) -> Option<CondensationTrigger> {
        if view.unhandled_condensation_request() {
            return Some(CondensationTrigger::Requested);
        }
        if let Some(budget) = budget.or(self.token_budget) {
            if budget.is_exceeded_by(view.estimated_tokens()) {
                return Some(CondensationTrigger::TokenBudget);
            }
        }
        (view.len() > self.max_size).then_some(CondensationTrigger::EventCount)
    }

    /// Whether `view` needs condensing.
    pub fn should_condense(&self, view: &View, budget: Option<TokenBudget>) -> bool {
        self.condensation_trigger(view, budget).is_some()
    }

    /// Choose the events to forget and summarize them.
    ///
    /// The returned condensation carries every id forgotten so far (the
    /// previous condensation's plus the new ones), since the latest
    /// condensation alone determines the view.
    pub async fn get_condensation(&self, view: &View) -> Result<Condensation> {
        let ForgottenRange {
            events: forgotten,
            summary_offset,
        } = self.select_forgotten(view)?;

        let previous: HashSet<&EventId> = view.forgotten_event_ids().iter().collect();
        let mut forgotten_event_ids: Vec<EventId> = view.forgotten_event_ids().to_vec();
        forgotten_event_ids.extend(
            forgotten
                .iter()
                .filter(|e| !matches!(e.kind, EventKind::CondensationSummary(_)))
                .filter(|e| !previous.contains(&e.id))
                .map(|e| e.id.clone()),
        );

        let request = SummaryRequest {
            previous_summary: view.summary(),
            forgotten: &forgotten,
        };
        let summary = self.summarizer.summarize(&request).await?;

        info!(
            forgotten = forgotten.len(),
            total_forgotten = forgotten_event_ids.len(),
            summary_chars = summary.len(),
            "condensation produced"
        );
        Ok(Condensation {
            forgotten_event_ids,
            summary: Some(summary),
            summary_offset: Some(summary_offset),
            originating_turn_id: view.last_batch_id().cloned(),
        })
    }

    /// Visible events the next condensation forgets, in order.
    ///
    /// The synthetic summary event may be among them; its text is carried
    /// forward as the previous summary instead of by id. The summary offset
    /// is the head actually kept after snapping, which can exceed
    /// `keep_first` when a batch straddles it.
    pub fn select_forgotten(&self, view: &View) -> Result<ForgottenRange> {
        let events = view.events();
        let n = events.len();
        let target = if view.unhandled_condensation_request() {
            n / 2
        } else {
            self.max_size / 2
        };
        let tail_count = self.tail_for(target);

        let legal: Vec<usize> = view
            .manipulation_indices()
            .iter()
            .map(|&b| boundary_offset(n, b))
            .collect();
        let snap = |at: usize| legal.iter().copied().find(|&b| b >= at).unwrap_or(n);

        let start = snap(self.keep_first.min(n));
        let end = snap(n.saturating_sub(tail_count).max(start));
        debug!(
            visible = n,
            target,
            tail_count,
            start,
            end,
            "condensation range selected"
        );
        if start >= end {
            return Err(ContextError::NothingToCondense);
        }

        let kept: Vec<Arc<Event>> = events[..start]
            .iter()
            .chain(&events[end..])
            .cloned()
            .collect();
        let extra = self.model.enforce(&kept, events);

        let forgotten: Vec<Arc<Event>> = events
            .iter()
            .enumerate()
            .filter(|(pos, e)| (start..end).contains(pos) || extra.contains(&e.id))
            .map(|(_, e)| e.clone())
            .collect();
        let summary_offset = events[..start]
            .iter()
            .filter(|e| !matches!(e.kind, EventKind::CondensationSummary(_)))
            .filter(|e| !extra.contains(&e.id))
            .count();
        Ok(ForgottenRange {
            events: forgotten,
            summary_offset,
        })
    }
}

fn signed(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
