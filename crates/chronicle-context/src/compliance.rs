//! Streaming protocol-compliance monitor.
//!
//! The model's wire protocol expects every tool call to be answered by
//! exactly one result before any other turn, and (for some providers)
//! parallel results in a particular order. [`ComplianceMonitor`] watches
//! events in append order and reports departures as
//! [`ComplianceViolation`] records.
//!
//! The monitor is advisory. It never returns an error and never blocks
//! ingestion; an internal failure is logged and treated as no violation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use chronicle_core::events::{Event, EventKind, Role};
use chronicle_core::ids::{BatchId, EventId, ToolCallId};
use chronicle_settings::ResultOrder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// Violations
// =============================================================================

/// Category of protocol departure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A result for a call id that was never issued.
    UnmatchedResult,
    /// A second result for an already resolved call id.
    DuplicateResult,
    /// A non-result turn while calls are still pending.
    InterleavedMessage,
    /// Parallel results resolved in an order the protocol does not accept.
    ToolResultOrder,
    /// An action reusing a call id that is pending or already answered.
    DuplicateCall,
}

/// One detected departure from the wire protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceViolation {
    /// Category.
    pub kind: ViolationKind,
    /// Event that triggered it.
    pub event_id: EventId,
    /// Call ids involved (the result's id, or the pending ids interrupted).
    pub tool_call_ids: Vec<ToolCallId>,
    /// Human-readable description.
    pub message: String,
}

// =============================================================================
// Result order policy
// =============================================================================

/// Accepted orderings for resolving the calls of one batch.
pub trait ResultOrderPolicy: Send + Sync {
    /// Name used in logs and violation messages.
    fn name(&self) -> &'static str;

    /// Whether `resolving` may be answered now, given the batch's calls in
    /// issue order and the ids already resolved.
    fn accepts(&self, issued: &[ToolCallId], resolved: &[ToolCallId], resolving: &ToolCallId)
    -> bool;
}

/// Results may arrive in any order.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyOrder;

impl ResultOrderPolicy for AnyOrder {
    fn name(&self) -> &'static str {
        "any"
    }

    fn accepts(&self, _: &[ToolCallId], _: &[ToolCallId], _: &ToolCallId) -> bool {
        true
    }
}

/// Results must arrive in the order their calls were issued.
#[derive(Clone, Copy, Debug, Default)]
pub struct IssueOrder;

impl ResultOrderPolicy for IssueOrder {
    fn name(&self) -> &'static str {
        "issue"
    }

    fn accepts(
        &self,
        issued: &[ToolCallId],
        resolved: &[ToolCallId],
        resolving: &ToolCallId,
    ) -> bool {
        issued
            .iter()
            .find(|id| !resolved.contains(id))
            .is_none_or(|next| next == resolving)
    }
}

/// Policy for a configured ordering rule.
pub fn policy_for(order: ResultOrder) -> Box<dyn ResultOrderPolicy> {
    match order {
        ResultOrder::Any => Box::new(AnyOrder),
        ResultOrder::Issue => Box::new(IssueOrder),
    }
}

// =============================================================================
// ComplianceMonitor
// =============================================================================

#[derive(Debug, Default)]
struct BatchProgress {
    issued: Vec<ToolCallId>,
    resolved: Vec<ToolCallId>,
}

/// Per-event protocol state machine.
pub struct ComplianceMonitor {
    pending: BTreeSet<ToolCallId>,
    completed: HashSet<ToolCallId>,
    all: HashSet<ToolCallId>,
    call_batch: HashMap<ToolCallId, BatchId>,
    batches: HashMap<BatchId, BatchProgress>,
    policy: Box<dyn ResultOrderPolicy>,
}

impl Default for ComplianceMonitor {
    fn default() -> Self {
        Self::new(Box::new(AnyOrder))
    }
}

impl std::fmt::Debug for ComplianceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceMonitor")
            .field("pending", &self.pending)
            .field("completed", &self.completed.len())
            .field("all", &self.all.len())
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

impl ComplianceMonitor {
    /// Create a monitor with a result-order policy.
    pub fn new(policy: Box<dyn ResultOrderPolicy>) -> Self {
        Self {
            pending: BTreeSet::new(),
            completed: HashSet::new(),
            all: HashSet::new(),
            call_batch: HashMap::new(),
            batches: HashMap::new(),
            policy,
        }
    }

    /// Calls issued and not yet answered.
    pub fn pending(&self) -> &BTreeSet<ToolCallId> {
        &self.pending
    }

    /// Whether `id` has been answered.
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    /// Number of distinct call ids ever issued or answered.
    pub fn seen_count(&self) -> usize {
        self.all.len()
    }

    /// Forget all state, keeping the policy.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.completed.clear();
        self.all.clear();
        self.call_batch.clear();
        self.batches.clear();
    }

    /// Feed every event of `events` in order, collecting violations.
    pub fn replay<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Vec<ComplianceViolation> {
        events.into_iter().flat_map(|e| self.process(e)).collect()
    }

    /// Advance the state machine by one event.
    ///
    /// Never panics: a failure inside the transition is logged at `warn`
    /// and yields no violation.
    pub fn process(&mut self, event: &Event) -> Vec<ComplianceViolation> {
        match catch_unwind(AssertUnwindSafe(|| self.transition(event))) {
            Ok(violations) => {
                for v in &violations {
                    debug!(
                        kind = ?v.kind,
                        event_id = %v.event_id,
                        calls = v.tool_call_ids.len(),
                        "compliance violation"
                    );
                }
                violations
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(
                    event_id = %event.id,
                    kind = event.kind_name(),
                    reason,
                    "compliance monitor failed, treating as no violation"
                );
                Vec::new()
            }
        }
    }

    fn transition(&mut self, event: &Event) -> Vec<ComplianceViolation> {
        match &event.kind {
            EventKind::Action(action) => {
                let mut violations = Vec::new();
                if self.pending_outside(&action.batch_id) {
                    violations.push(self.interleaved(event, "new batch issued"));
                }
                let call = &action.tool_call_id;
                if self.pending.contains(call) {
                    violations.push(Self::duplicate_call(event, call, "still pending"));
                    return violations;
                }
                if self.completed.remove(call) {
                    violations.push(Self::duplicate_call(event, call, "already answered"));
                }
                let _ = self.pending.insert(action.tool_call_id.clone());
                let _ = self.all.insert(action.tool_call_id.clone());
                let _ = self
                    .call_batch
                    .insert(action.tool_call_id.clone(), action.batch_id.clone());
                self.batches
                    .entry(action.batch_id.clone())
                    .or_default()
                    .issued
                    .push(action.tool_call_id.clone());
                violations
            }
            EventKind::Observation(_) | EventKind::AgentError(_) => {
                let Some(base) = event.observation_base() else {
                    return Vec::new();
                };
                self.resolve(event, base.tool_call_id)
            }
            EventKind::Message(message) => {
                let allowed = message.role == Role::Agent
                    && message
                        .batch_id
                        .as_ref()
                        .is_some_and(|b| !self.pending_outside(b));
                if self.pending.is_empty() || allowed {
                    Vec::new()
                } else {
                    vec![self.interleaved(event, "message")]
                }
            }
            EventKind::SystemPrompt(_) => {
                if self.pending.is_empty() {
                    Vec::new()
                } else {
                    vec![self.interleaved(event, "system prompt")]
                }
            }
            EventKind::Condensation(_)
            | EventKind::CondensationRequest(_)
            | EventKind::CondensationSummary(_) => Vec::new(),
        }
    }

    fn resolve(&mut self, event: &Event, call: &ToolCallId) -> Vec<ComplianceViolation> {
        if self.pending.remove(call) {
            let mut violations = Vec::new();
            if let Some(progress) = self
                .call_batch
                .get(call)
                .and_then(|b| self.batches.get_mut(b))
            {
                if !self
                    .policy
                    .accepts(&progress.issued, &progress.resolved, call)
                {
                    violations.push(ComplianceViolation {
                        kind: ViolationKind::ToolResultOrder,
                        event_id: event.id.clone(),
                        tool_call_ids: vec![call.clone()],
                        message: format!(
                            "result for {call} arrived out of {} order",
                            self.policy.name()
                        ),
                    });
                }
                progress.resolved.push(call.clone());
            }
            let _ = self.completed.insert(call.clone());
            return violations;
        }

        let (kind, message) = if self.completed.contains(call) {
            (
                ViolationKind::DuplicateResult,
                format!("second result for {call}"),
            )
        } else {
            (
                ViolationKind::UnmatchedResult,
                format!("result for {call}, which was never issued"),
            )
        };
        let _ = self.all.insert(call.clone());
        vec![ComplianceViolation {
            kind,
            event_id: event.id.clone(),
            tool_call_ids: vec![call.clone()],
            message,
        }]
    }

    fn duplicate_call(event: &Event, call: &ToolCallId, state: &str) -> ComplianceViolation {
        ComplianceViolation {
            kind: ViolationKind::DuplicateCall,
            event_id: event.id.clone(),
            tool_call_ids: vec![call.clone()],
            message: format!("call id {call} reissued while {state}"),
        }
    }

    /// Whether any pending call belongs to a batch other than `batch`.
    fn pending_outside(&self, batch: &BatchId) -> bool {
        self.pending
            .iter()
            .any(|id| self.call_batch.get(id) != Some(batch))
    }

    fn interleaved(&self, event: &Event, what: &str) -> ComplianceViolation {
        let ids: Vec<ToolCallId> = self.pending.iter().cloned().collect();
        let names: Vec<&str> = ids.iter().map(ToolCallId::as_str).collect();
        ComplianceViolation {
            kind: ViolationKind::InterleavedMessage,
            event_id: event.id.clone(),
            message: format!("{what} while calls pending: [{}]", names.join(", ")),
            tool_call_ids: ids,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{action, fail, observe};
    use chronicle_core::logging::test_utils::capture_logs;

    fn kinds(violations: &[ComplianceViolation]) -> Vec<ViolationKind> {
        violations.iter().map(|v| v.kind).collect()
    }

    // ── Happy path ────────────────────────────────────────────────────

    #[test]
    fn matched_results_produce_no_violation() {
        let mut monitor = ComplianceMonitor::default();
        let b = BatchId::new();
        let c1 = action(&b, "c1");
        let c2 = action(&b, "c2");
        let events = [
            Event::user_message("go"),
            Event::agent_message("running two", Some(b.clone())),
            c1.clone(),
            c2.clone(),
            observe(&c2),
            fail(&c1),
            Event::user_message("thanks"),
        ];
        assert!(monitor.replay(&events).is_empty());
        assert!(monitor.pending().is_empty());
        assert!(monitor.is_completed("c1"));
        assert_eq!(monitor.seen_count(), 2);
    }

    // ── Result violations ─────────────────────────────────────────────

    #[test]
    fn unmatched_result() {
        let mut monitor = ComplianceMonitor::default();
        let stray = action(&BatchId::new(), "ghost");
        let v = monitor.process(&observe(&stray));
        assert_eq!(kinds(&v), vec![ViolationKind::UnmatchedResult]);
        assert_eq!(v[0].tool_call_ids[0].as_str(), "ghost");
    }

    #[test]
    fn duplicate_result() {
        let mut monitor = ComplianceMonitor::default();
        let c1 = action(&BatchId::new(), "c1");
        let _ = monitor.process(&c1);
        assert!(monitor.process(&fail(&c1)).is_empty());
        let v = monitor.process(&observe(&c1));
        assert_eq!(kinds(&v), vec![ViolationKind::DuplicateResult]);
    }

    #[test]
    fn repeated_stray_result_is_unmatched_not_duplicate() {
        let mut monitor = ComplianceMonitor::default();
        let stray = action(&BatchId::new(), "ghost");
        let _ = monitor.process(&observe(&stray));
        let v = monitor.process(&observe(&stray));
        assert_eq!(kinds(&v), vec![ViolationKind::UnmatchedResult]);
    }

    #[test]
    fn reissued_answered_call_is_flagged_and_pending_again() {
        let mut monitor = ComplianceMonitor::default();
        let b = BatchId::new();
        let c5 = action(&b, "c5");
        let _ = monitor.process(&c5);
        let _ = monitor.process(&observe(&c5));

        let v = monitor.process(&action(&b, "c5"));
        assert_eq!(kinds(&v), vec![ViolationKind::DuplicateCall]);
        assert!(!monitor.is_completed("c5"));
        assert_eq!(monitor.pending().len(), 1);
        assert!(monitor.process(&observe(&c5)).is_empty());
    }

    #[test]
    fn reissued_pending_call_is_flagged() {
        let mut monitor = ComplianceMonitor::default();
        let b = BatchId::new();
        let _ = monitor.process(&action(&b, "c1"));
        let v = monitor.process(&action(&b, "c1"));
        assert_eq!(kinds(&v), vec![ViolationKind::DuplicateCall]);
        assert!(v[0].message.contains("still pending"));
        assert_eq!(monitor.pending().len(), 1);
    }

    // ── Interleaving ──────────────────────────────────────────────────

    #[test]
    fn user_message_while_pending() {
        let mut monitor = ComplianceMonitor::default();
        let b = BatchId::new();
        let _ = monitor.process(&action(&b, "c2"));
        let _ = monitor.process(&action(&b, "c1"));

        let v = monitor.process(&Event::user_message("hello?"));
        assert_eq!(kinds(&v), vec![ViolationKind::InterleavedMessage]);
        let named: Vec<&str> = v[0].tool_call_ids.iter().map(ToolCallId::as_str).collect();
        assert_eq!(named, vec!["c1", "c2"]);
        assert!(v[0].message.contains("c1, c2"));
    }

    #[test]
    fn agent_message_of_other_batch_while_pending() {
        let mut monitor = ComplianceMonitor::default();
        let _ = monitor.process(&action(&BatchId::new(), "c1"));
        let v = monitor.process(&Event::agent_message("unrelated", None));
        assert_eq!(kinds(&v), vec![ViolationKind::InterleavedMessage]);
    }

    #[test]
    fn new_batch_while_pending() {
        let mut monitor = ComplianceMonitor::default();
        let _ = monitor.process(&action(&BatchId::new(), "c1"));
        let v = monitor.process(&action(&BatchId::new(), "c2"));
        assert_eq!(kinds(&v), vec![ViolationKind::InterleavedMessage]);
        assert_eq!(monitor.pending().len(), 2);
    }

    #[test]
    fn control_events_never_violate() {
        let mut monitor = ComplianceMonitor::default();
        let _ = monitor.process(&action(&BatchId::new(), "c1"));
        assert!(monitor.process(&Event::condensation_request(None)).is_empty());
        assert!(monitor.process(&Event::condensation_summary("s")).is_empty());
    }

    // ── Result order ──────────────────────────────────────────────────

    #[test]
    fn issue_order_flags_out_of_order_results() {
        let mut monitor = ComplianceMonitor::new(policy_for(ResultOrder::Issue));
        let b = BatchId::new();
        let c1 = action(&b, "c1");
        let c2 = action(&b, "c2");
        let _ = monitor.replay([&c1, &c2]);

        let v = monitor.process(&observe(&c2));
        assert_eq!(kinds(&v), vec![ViolationKind::ToolResultOrder]);
        assert!(monitor.process(&observe(&c1)).is_empty());
        assert!(monitor.pending().is_empty());
    }

    #[test]
    fn issue_order_accepts_in_order_results() {
        let mut monitor = ComplianceMonitor::new(Box::new(IssueOrder));
        let b = BatchId::new();
        let c1 = action(&b, "c1");
        let c2 = action(&b, "c2");
        let events = [c1.clone(), c2.clone(), observe(&c1), observe(&c2)];
        assert!(monitor.replay(&events).is_empty());
    }

    #[test]
    fn any_order_accepts_everything() {
        let calls: Vec<ToolCallId> = ["a", "b"]
            .iter()
            .map(|s| ToolCallId::from_string((*s).to_string()))
            .collect();
        assert!(AnyOrder.accepts(&calls, &[], &calls[1]));
    }

    // ── Failure isolation ─────────────────────────────────────────────

    struct Exploding;

    impl ResultOrderPolicy for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn accepts(&self, _: &[ToolCallId], _: &[ToolCallId], _: &ToolCallId) -> bool {
            panic!("policy bug")
        }
    }

    #[test]
    fn internal_failure_is_logged_not_raised() {
        let (logs, _guard) = capture_logs();
        let mut monitor = ComplianceMonitor::new(Box::new(Exploding));
        let c1 = action(&BatchId::new(), "c1");
        let _ = monitor.process(&c1);

        let v = monitor.process(&observe(&c1));
        assert!(v.is_empty());
        assert!(logs.has_message("compliance monitor failed"));
    }

    #[test]
    fn violation_serializes_camel_case() {
        let v = ComplianceViolation {
            kind: ViolationKind::DuplicateResult,
            event_id: EventId::from_string("e1".into()),
            tool_call_ids: vec![ToolCallId::from_string("c1".into())],
            message: "second result".into(),
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["kind"], "duplicate_result");
        assert_eq!(json["toolCallIds"][0], "c1");
    }

    // ── Property tests ────────────────────────────────────────────────

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Step {
            Call { batch: u8, call: u8 },
            Result { call: u8, ok: bool },
            User,
            Agent { batch: Option<u8> },
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0u8..3, 0u8..6).prop_map(|(batch, call)| Step::Call { batch, call }),
                (0u8..8, any::<bool>()).prop_map(|(call, ok)| Step::Result { call, ok }),
                Just(Step::User),
                prop::option::of(0u8..3).prop_map(|batch| Step::Agent { batch }),
            ]
        }

        proptest! {
            #[test]
            fn monitor_never_panics(
                steps in prop::collection::vec(step(), 0..60),
                strict in any::<bool>(),
            ) {
                let batches: Vec<BatchId> = (0..3).map(|_| BatchId::new()).collect();
                let order = if strict { ResultOrder::Issue } else { ResultOrder::Any };
                let mut monitor = ComplianceMonitor::new(policy_for(order));
                for step in steps {
                    let event = match step {
                        Step::Call { batch, call } => action(&batches[batch as usize], &format!("c{call}")),
                        Step::Result { call, ok } => {
                            let a = action(&batches[0], &format!("c{call}"));
                            if ok { observe(&a) } else { fail(&a) }
                        }
                        Step::User => Event::user_message("u"),
                        Step::Agent { batch } => {
                            Event::agent_message("a", batch.map(|b| batches[b as usize].clone()))
                        }
                    };
                    let _ = monitor.process(&event);
                    prop_assert!(monitor.pending().iter().all(|id| !monitor.is_completed(id)));
                }
            }
        }
    }
}
