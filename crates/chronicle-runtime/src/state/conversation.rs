//! The conversation: event store, derived caches, and their lock.
//!
//! One [`parking_lot::FairMutex`] guards the store, the compliance monitor,
//! and block bookkeeping. It is FIFO so a busy control loop cannot starve
//! other writers, and it is held only across the append itself: never across
//! a summarization or tool call. Subscriber delivery happens after the lock is
//! released.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_context::{
    ComplianceMonitor, ComplianceViolation, Condenser, View, policy_for,
};
use chronicle_core::cancel::CancelToken;
use chronicle_core::events::{Event, EventKind};
use chronicle_core::ids::{ConversationId, EventId};
use chronicle_core::payload::PayloadRegistry;
use chronicle_events::{EventPersistence, EventStore, EventStoreError, Page, PageOrder};
use chronicle_settings::ComplianceSettings;
use parking_lot::FairMutex;
use tracing::{debug, info, warn};

use super::execution::ExecutionControl;
use super::restore::{
    check_tool_compatibility, check_tools, read_base_state, write_base_state,
};
use super::subscribers::{EventCallback, Subscribers, SubscriptionId, Timeline};
use crate::errors::Result;
use crate::types::{AgentConfig, BaseState, ConversationStats, ExecutionStatus};

struct Inner {
    store: EventStore,
    monitor: ComplianceMonitor,
    violations: Vec<ComplianceViolation>,
    base: BaseState,
    blocked_actions: HashMap<EventId, String>,
    blocked_messages: HashMap<EventId, String>,
}

/// Shared state of one conversation.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ConversationState {
    id: ConversationId,
    inner: FairMutex<Inner>,
    timeline: Timeline,
    subscribers: Subscribers,
    execution: ExecutionControl,
    persistence: Option<Arc<dyn EventPersistence>>,
    payloads: Option<Arc<PayloadRegistry>>,
}

impl std::fmt::Debug for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationState")
            .field("id", &self.id)
            .field("events", &self.timeline.len())
            .field("subscribers", &self.subscribers.len())
            .field("status", &self.execution.status())
            .finish_non_exhaustive()
    }
}

impl ConversationState {
    // ── Construction ─────────────────────────────────────────────────

    /// Start an in-memory conversation.
    pub fn new(config: &AgentConfig, compliance: &ComplianceSettings) -> Self {
        let id = ConversationId::new();
        let base = BaseState::new(id.clone(), config);
        Self::assemble(id, base, EventStore::new(), compliance, None)
    }

    /// Start a persisted conversation, writing its sidecar.
    pub fn create(
        config: &AgentConfig,
        compliance: &ComplianceSettings,
        persistence: Arc<dyn EventPersistence>,
    ) -> Result<Self> {
        let id = ConversationId::new();
        let base = BaseState::new(id.clone(), config);
        write_base_state(persistence.as_ref(), &base)?;
        info!(conversation_id = %id, backend = %persistence.describe(), "conversation created");
        Ok(Self::assemble(
            id,
            base,
            EventStore::new(),
            compliance,
            Some(persistence),
        ))
    }

    /// Reattach to a persisted conversation.
    ///
    /// Replays every stored event, rebuilding the compliance state, then
    /// checks `config`'s tools against the stored system prompt. Any other
    /// configuration change is accepted and recorded in the history.
    pub fn restore(
        config: &AgentConfig,
        compliance: &ComplianceSettings,
        persistence: Arc<dyn EventPersistence>,
    ) -> Result<Self> {
        let events = persistence.load_events()?;
        check_tool_compatibility(&events, config)?;

        let mut base = match read_base_state(persistence.as_ref())? {
            Some(base) => base,
            None => {
                warn!(backend = %persistence.describe(), "no base state found, starting history");
                BaseState::new(ConversationId::new(), config)
            }
        };
        let replayed = events.len();
        let store = EventStore::from_events(events)?;

        let history_grew = base.record(config);
        write_base_state(persistence.as_ref(), &base)?;
        let id = base.conversation_id.clone();
        let state = Self::assemble(id, base, store, compliance, Some(persistence));

        let violations = {
            let inner = state.inner.lock();
            inner.violations.len()
        };
        info!(
            conversation_id = %state.id,
            replayed,
            violations,
            history_grew,
            "conversation restored"
        );
        Ok(state)
    }

    /// Restore when a sidecar exists, otherwise create.
    pub fn open(
        config: &AgentConfig,
        compliance: &ComplianceSettings,
        persistence: Arc<dyn EventPersistence>,
    ) -> Result<Self> {
        if persistence.read_base_state()?.is_some() {
            Self::restore(config, compliance, persistence)
        } else {
            Self::create(config, compliance, persistence)
        }
    }

    /// Validate every appended action payload against `registry`.
    ///
    /// Replayed history is not re-checked.
    #[must_use]
    pub fn with_payloads(mut self, registry: Arc<PayloadRegistry>) -> Self {
        self.payloads = Some(registry);
        self
    }

    fn assemble(
        id: ConversationId,
        base: BaseState,
        store: EventStore,
        compliance: &ComplianceSettings,
        persistence: Option<Arc<dyn EventPersistence>>,
    ) -> Self {
        let mut monitor = ComplianceMonitor::new(policy_for(compliance.result_order));
        let timeline = Timeline::default();
        let mut violations = Vec::new();
        for event in store.iter() {
            violations.extend(monitor.process(event));
            timeline.push(Arc::clone(event));
        }
        Self {
            id,
            inner: FairMutex::new(Inner {
                store,
                monitor,
                violations,
                base,
                blocked_actions: HashMap::new(),
                blocked_messages: HashMap::new(),
            }),
            timeline,
            subscribers: Subscribers::default(),
            execution: ExecutionControl::default(),
            persistence,
            payloads: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Conversation identity.
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Number of events, read without the conversation lock.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// Whether no event has been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events from `position` on, read without the conversation lock.
    pub fn events_since(&self, position: usize) -> Vec<Arc<Event>> {
        self.timeline.since(position)
    }

    /// Look up an event by id.
    pub fn get(&self, id: &str) -> Result<Arc<Event>> {
        let inner = self.inner.lock();
        Ok(Arc::clone(inner.store.get(id)?))
    }

    /// One page of events.
    pub fn page(&self, cursor: Option<&str>, limit: usize, order: PageOrder) -> Result<Page> {
        let inner = self.inner.lock();
        Ok(inner.store.page(cursor, limit, order)?)
    }

    /// Configuration currently attached.
    pub fn config(&self) -> Option<AgentConfig> {
        self.inner.lock().base.current().cloned()
    }

    /// Sidecar contents (identity and configuration history).
    pub fn base_state(&self) -> BaseState {
        self.inner.lock().base.clone()
    }

    /// Every compliance violation recorded so far, including during replay.
    pub fn violations(&self) -> Vec<ComplianceViolation> {
        self.inner.lock().violations.clone()
    }

    /// Project the current view.
    pub fn view(&self) -> View {
        let inner = self.inner.lock();
        View::from_events(inner.store.events())
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> ConversationStats {
        let inner = self.inner.lock();
        let view = View::from_events(inner.store.events());
        let condensations = inner
            .store
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Condensation(_)))
            .count();
        ConversationStats {
            events: inner.store.len(),
            visible: view.len(),
            pending_tool_calls: inner.monitor.pending().len(),
            violations: inner.violations.len(),
            condensations,
            estimated_tokens: view.estimated_tokens(),
            status: self.execution.status(),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Append an event: store, compliance check, persistence, then
    /// subscriber delivery once the lock is released.
    ///
    /// Compliance violations are recorded, never returned as errors. An
    /// action whose payload fails the registered schema is rejected before
    /// it is stored. A persistence failure is returned after the event is
    /// already visible in memory.
    pub fn add_event(&self, event: Event) -> Result<EventId> {
        if let (Some(registry), Some(action)) = (&self.payloads, event.as_action()) {
            if let Err(err) = registry.validate(&action.payload) {
                warn!(
                    conversation_id = %self.id,
                    event_id = %event.id,
                    tool = %action.tool_name,
                    error = %err,
                    "action payload rejected"
                );
                return Err(err.into());
            }
        }
        let (id, persisted) = {
            let mut inner = self.inner.lock();
            let position = inner.store.append(event)?;
            let stored = inner.store.at(position).cloned().ok_or_else(|| {
                EventStoreError::InvalidOperation(format!("no event at position {position}"))
            })?;

            let violations = inner.monitor.process(&stored);
            for v in &violations {
                warn!(
                    conversation_id = %self.id,
                    event_id = %stored.id,
                    kind = ?v.kind,
                    detail = %v.message,
                    "compliance violation"
                );
            }
            inner.violations.extend(violations);

            self.timeline.push(Arc::clone(&stored));
            let persisted = match &self.persistence {
                Some(p) => p.persist_event(position, &stored),
                None => Ok(()),
            };
            debug!(
                conversation_id = %self.id,
                event_id = %stored.id,
                kind = stored.kind_name(),
                position,
                "event appended"
            );
            (stored.id.clone(), persisted)
        };

        self.subscribers.dispatch(&self.timeline);
        persisted?;
        Ok(id)
    }

    /// Append a tool result unless execution was interrupted or stopped.
    ///
    /// Returns `None` when the result was discarded.
    pub fn accept_tool_result(&self, event: Event) -> Result<Option<EventId>> {
        if !self.execution.accepts_results() {
            debug!(
                conversation_id = %self.id,
                status = ?self.execution.status(),
                tool_call_id = ?event.tool_call_id(),
                "discarding tool result after interrupt"
            );
            return Ok(None);
        }
        self.add_event(event).map(Some)
    }

    /// Append an explicit condensation request.
    pub fn request_condensation(&self, reason: Option<String>) -> Result<EventId> {
        self.add_event(Event::condensation_request(reason))
    }

    /// Condense the view if `condenser` says it needs it.
    ///
    /// The lock is taken only to project the view and to append the result;
    /// the summarization call runs without it. On failure nothing is
    /// appended and the view stays as it was.
    pub async fn condense_if_needed(&self, condenser: &Condenser) -> Result<Option<EventId>> {
        let view = self.view();
        let Some(trigger) = condenser.condensation_trigger(&view, None) else {
            return Ok(None);
        };
        info!(
            conversation_id = %self.id,
            ?trigger,
            visible = view.len(),
            "condensing"
        );
        let condensation = condenser.get_condensation(&view).await?;
        self.add_event(Event::condensation(condensation)).map(Some)
    }

    /// Attach a new configuration. Tools must not change.
    pub fn update_config(&self, config: &AgentConfig) -> Result<bool> {
        let mut inner = self.inner.lock();
        if let Some(recorded) = inner.store.iter().find_map(|e| e.as_system_prompt()) {
            check_tools(recorded, config)?;
        }
        if !inner.base.record(config) {
            return Ok(false);
        }
        if let Some(p) = &self.persistence {
            write_base_state(p.as_ref(), &inner.base)?;
        }
        debug!(conversation_id = %self.id, model = %config.model, "configuration recorded");
        Ok(true)
    }

    // ── Subscribers ──────────────────────────────────────────────────

    /// Register a callback for every event, past and future.
    ///
    /// Does not take the conversation lock: history is delivered from the
    /// lock-free timeline, so this completes while a writer holds the lock.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Arc<Event>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let callback: EventCallback = Box::new(callback);
        self.subscribers.subscribe(&self.timeline, callback)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ── Blocking ─────────────────────────────────────────────────────

    /// Mark an action as blocked before execution.
    pub fn block_action(&self, id: EventId, reason: impl Into<String>) {
        let _ = self.inner.lock().blocked_actions.insert(id, reason.into());
    }

    /// Mark a message as blocked.
    pub fn block_message(&self, id: EventId, reason: impl Into<String>) {
        let _ = self.inner.lock().blocked_messages.insert(id, reason.into());
    }

    /// Reason an action or message is blocked, if it is.
    pub fn blocked_reason(&self, id: &str) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .blocked_actions
            .get(id)
            .or_else(|| inner.blocked_messages.get(id))
            .cloned()
    }

    /// Whether an action or message is blocked.
    pub fn is_blocked(&self, id: &str) -> bool {
        self.blocked_reason(id).is_some()
    }

    /// Clear an action's block, returning its reason.
    pub fn pop_blocked_action(&self, id: &str) -> Option<String> {
        self.inner.lock().blocked_actions.remove(id)
    }

    /// Clear a message's block, returning its reason.
    pub fn pop_blocked_message(&self, id: &str) -> Option<String> {
        self.inner.lock().blocked_messages.remove(id)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Current execution status.
    pub fn status(&self) -> ExecutionStatus {
        self.execution.status()
    }

    /// Set the execution status.
    pub fn set_status(&self, status: ExecutionStatus) {
        self.execution.set_status(status);
    }

    /// Start a model call; the token is cancelled by [`Self::interrupt`].
    pub fn begin_model_call(&self) -> CancelToken {
        self.execution.begin_model_call()
    }

    /// The active model call returned.
    pub fn end_model_call(&self) {
        self.execution.end_model_call();
    }

    /// Cancel the active model call and flip status to interrupted.
    pub fn interrupt(&self) -> bool {
        self.execution.interrupt()
    }

    /// Token cancelled by [`Self::stop`], for work outside model calls.
    pub fn cancel_token(&self) -> CancelToken {
        self.execution.root().child()
    }

    /// Cancel all work and finish.
    pub fn stop(&self) {
        self.execution.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StateError;
    use chronicle_context::ViolationKind;
    use chronicle_core::events::ToolSpec;
    use chronicle_core::ids::{BatchId, ToolCallId};
    use chronicle_core::payload::{PayloadError, ToolPayload};
    use chronicle_events::InMemoryPersistence;
    use parking_lot::Mutex;

    fn config() -> AgentConfig {
        AgentConfig::new("model-a").with_tools(vec![ToolSpec::new("terminal", "run")])
    }

    fn state() -> ConversationState {
        ConversationState::new(&config(), &ComplianceSettings::default())
    }

    fn action(batch: &BatchId, call: &str) -> Event {
        Event::action(
            batch.clone(),
            ToolCallId::from_string(call.to_string()),
            "terminal",
            ToolPayload::new("terminal.command", serde_json::json!({"cmd": "ls"})),
        )
    }

    #[test]
    fn add_event_assigns_order_and_indexes() {
        let state = state();
        let first = state.add_event(config().system_prompt("sys")).unwrap();
        let second = state.add_event(Event::user_message("hi")).unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get(first.as_str()).unwrap().kind_name(), "system_prompt");
        assert_eq!(state.events_since(1)[0].id, second);
    }

    #[test]
    fn violations_are_recorded_not_raised() {
        let state = state();
        let b = BatchId::new();
        let _ = state.add_event(action(&b, "c1")).unwrap();
        let _ = state.add_event(Event::user_message("interrupting")).unwrap();

        let violations = state.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::InterleavedMessage);
        assert_eq!(state.stats().pending_tool_calls, 1);
    }

    #[test]
    fn persisted_in_append_order() {
        let persistence = InMemoryPersistence::new();
        let state = ConversationState::create(
            &config(),
            &ComplianceSettings::default(),
            Arc::new(persistence.clone()),
        )
        .unwrap();
        let _ = state.add_event(config().system_prompt("sys")).unwrap();
        let _ = state.add_event(Event::user_message("hi")).unwrap();
        assert_eq!(persistence.len(), 2);
        assert!(persistence.read_base_state().unwrap().is_some());
    }

    #[test]
    fn subscriber_sees_history_and_new_events_once() {
        let state = state();
        let _ = state.add_event(Event::user_message("before")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = state.subscribe(move |e| sink.lock().push(e.to_text()));
        let _ = state.add_event(Event::user_message("after")).unwrap();

        assert_eq!(*seen.lock(), vec!["[user] before", "[user] after"]);
        assert!(state.unsubscribe(id));
        let _ = state.add_event(Event::user_message("unseen")).unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn result_after_interrupt_is_discarded() {
        let state = state();
        let b = BatchId::new();
        let call = action(&b, "c1");
        let _ = state.add_event(call.clone()).unwrap();

        let token = state.begin_model_call();
        assert!(state.interrupt());
        assert!(token.is_cancelled());

        let result = Event::observation_for(&call, "late").unwrap();
        assert!(state.accept_tool_result(result).unwrap().is_none());
        assert_eq!(state.len(), 1);
        assert_eq!(state.status(), ExecutionStatus::Interrupted);
    }

    #[test]
    fn result_while_running_is_recorded() {
        let state = state();
        let call = action(&BatchId::new(), "c1");
        let _ = state.add_event(call.clone()).unwrap();
        let _ = state.begin_model_call();
        let result = Event::observation_for(&call, "ok").unwrap();
        assert!(state.accept_tool_result(result).unwrap().is_some());
        assert_eq!(state.stats().pending_tool_calls, 0);
    }

    #[test]
    fn block_bookkeeping() {
        let state = state();
        let id = state.add_event(action(&BatchId::new(), "c1")).unwrap();
        assert!(!state.is_blocked(id.as_str()));

        state.block_action(id.clone(), "hook denied");
        assert!(state.is_blocked(id.as_str()));
        assert_eq!(state.blocked_reason(id.as_str()).as_deref(), Some("hook denied"));
        assert_eq!(state.pop_blocked_action(id.as_str()).as_deref(), Some("hook denied"));
        assert!(!state.is_blocked(id.as_str()));

        let msg = state.add_event(Event::agent_message("secret", None)).unwrap();
        state.block_message(msg.clone(), "redacted");
        assert!(state.is_blocked(msg.as_str()));
        assert!(state.pop_blocked_message(msg.as_str()).is_some());
    }

    #[test]
    fn update_config_records_only_changes() {
        let state = state();
        let _ = state.add_event(config().system_prompt("sys")).unwrap();
        assert!(!state.update_config(&config()).unwrap());

        let mut changed = config();
        changed.skills = vec!["review".into()];
        assert!(state.update_config(&changed).unwrap());
        assert_eq!(state.base_state().config_history.len(), 2);

        let mut retooled = config();
        retooled.tools.push(ToolSpec::new("browser", "browse"));
        assert!(matches!(
            state.update_config(&retooled),
            Err(StateError::RestoreIncompatible { .. })
        ));
    }

    #[test]
    fn registered_payloads_are_checked_on_append() {
        #[derive(serde::Deserialize)]
        struct Command {
            #[allow(dead_code)]
            cmd: String,
        }

        let mut registry = PayloadRegistry::new();
        let _ = registry.register::<Command>("terminal.command");
        let state = state().with_payloads(Arc::new(registry));
        let b = BatchId::new();

        assert!(state.add_event(action(&b, "c1")).is_ok());

        let unknown = Event::action(
            b.clone(),
            ToolCallId::from_string("c2".into()),
            "browser",
            ToolPayload::new("browser.click", serde_json::json!({})),
        );
        let err = state.add_event(unknown).unwrap_err();
        assert!(matches!(err, StateError::Payload(PayloadError::UnknownKind(_))));

        let malformed = Event::action(
            b,
            ToolCallId::from_string("c3".into()),
            "terminal",
            ToolPayload::new("terminal.command", serde_json::json!({"command": 1})),
        );
        assert!(matches!(
            state.add_event(malformed),
            Err(StateError::Payload(PayloadError::Invalid { .. }))
        ));
        assert_eq!(state.len(), 1);
        assert!(state.add_event(Event::user_message("plain")).is_ok());
    }

    #[test]
    fn failed_restore_leaves_sidecar_untouched() {
        let persistence = InMemoryPersistence::new();
        let created = ConversationState::create(
            &config(),
            &ComplianceSettings::default(),
            Arc::new(persistence.clone()),
        )
        .unwrap();
        let prompt = config().system_prompt("sys");
        persistence.persist_event(0, &prompt).unwrap();
        persistence.persist_event(1, &prompt).unwrap();
        drop(created);

        let mut changed = config();
        changed.model = "model-b".into();
        let err = ConversationState::restore(
            &changed,
            &ComplianceSettings::default(),
            Arc::new(persistence.clone()),
        )
        .unwrap_err();
        assert!(matches!(err, StateError::Store(EventStoreError::DuplicateEvent(_))));

        let sidecar = persistence.read_base_state().unwrap().unwrap();
        let base: BaseState = serde_json::from_value(sidecar).unwrap();
        assert_eq!(base.config_history.len(), 1);
    }

    #[test]
    fn stats_reflect_state() {
        let state = state();
        let _ = state.add_event(Event::user_message("abcdefgh")).unwrap();
        let stats = state.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.visible, 1);
        assert_eq!(stats.violations, 0);
        assert_eq!(stats.condensations, 0);
        assert!(stats.estimated_tokens > 0);
        assert_eq!(stats.status, ExecutionStatus::Idle);
    }
}
