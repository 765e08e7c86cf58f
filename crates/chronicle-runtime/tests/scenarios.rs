//! End-to-end scenarios through the public conversation surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chronicle_context::{
    Condenser, ContextError, Summarizer, SummarizerError, SummaryRequest, WireRole,
    to_wire_messages,
};
use chronicle_core::content::ReasoningBlock;
use chronicle_core::events::{Event, EventKind, ToolSpec};
use chronicle_core::ids::{BatchId, ToolCallId};
use chronicle_core::payload::ToolPayload;
use chronicle_events::PageOrder;
use chronicle_runtime::{AgentConfig, ConversationState, StateError};
use chronicle_settings::{ComplianceSettings, CondenserSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Fixed(&'static str);

#[async_trait]
impl Summarizer for Fixed {
    async fn summarize(&self, _request: &SummaryRequest<'_>) -> Result<String, SummarizerError> {
        Ok(self.0.to_string())
    }
}

struct Unavailable;

#[async_trait]
impl Summarizer for Unavailable {
    async fn summarize(&self, _request: &SummaryRequest<'_>) -> Result<String, SummarizerError> {
        Err(SummarizerError::CallFailed {
            message: "model unavailable".into(),
        })
    }
}

fn config() -> AgentConfig {
    AgentConfig::new("model-a").with_tools(vec![ToolSpec::new("terminal", "run commands")])
}

fn conversation() -> ConversationState {
    let state = ConversationState::new(&config(), &ComplianceSettings::default());
    let _ = state.add_event(config().system_prompt("sys")).unwrap();
    state
}

fn action(batch: &BatchId, call: &str) -> Event {
    Event::action(
        batch.clone(),
        ToolCallId::from_string(call.to_string()),
        "terminal",
        ToolPayload::new("terminal.command", serde_json::json!({"cmd": call})),
    )
}

fn thresholds(max_size: usize, keep_first: usize) -> CondenserSettings {
    CondenserSettings {
        max_size,
        keep_first,
        max_tokens: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reverse_page_of_500_is_fast_and_recent() {
    let state = conversation();
    for i in 0..500 {
        let _ = state.add_event(Event::user_message(format!("m{i}"))).unwrap();
    }

    let started = Instant::now();
    let page = state.page(None, 10, PageOrder::ReverseChronological).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let texts: Vec<String> = page.events.iter().map(|e| e.to_text()).collect();
    assert_eq!(texts.len(), 10);
    assert_eq!(texts[0], "[user] m499");
    assert_eq!(texts[9], "[user] m490");

    let cursor = page.next_cursor.unwrap();
    let next = state
        .page(Some(cursor.as_str()), 10, PageOrder::ReverseChronological)
        .unwrap();
    assert_eq!(next.events[0].to_text(), "[user] m489");
}

#[test]
fn error_then_real_result_keeps_the_result() {
    let state = conversation();
    let call = action(&BatchId::new(), "c1");
    let _ = state.add_event(call.clone()).unwrap();
    let _ = state
        .add_event(Event::agent_error_for(&call, "worker restarted", false).unwrap())
        .unwrap();
    let _ = state
        .add_event(Event::observation_for(&call, "file.txt").unwrap())
        .unwrap();

    let view = state.view();
    let results: Vec<&Event> = view
        .iter()
        .map(|e| &**e)
        .filter(|e| e.observation_base().is_some())
        .collect();
    assert_eq!(results.len(), 1);
    assert_matches!(results[0].kind, EventKind::Observation(_));

    // The second result is still reported as a duplicate.
    assert_eq!(state.violations().len(), 1);
}

#[test]
fn inconsistent_thresholds_are_rejected() {
    let err = Condenser::new(&thresholds(8, 4), Arc::new(Fixed("s"))).unwrap_err();
    assert_matches!(err, ContextError::Configuration(ref msg) if msg.contains("= -1"));
}

#[test]
fn forgetting_reasoning_batch_hides_later_batches() {
    let state = conversation();
    let a = BatchId::new();
    let b = BatchId::new();
    let a1 = action(&a, "a1").with_reasoning(vec![ReasoningBlock::thinking("plan")]);
    let b1 = action(&b, "b1");
    for e in [
        a1.clone(),
        Event::observation_for(&a1, "ok").unwrap(),
        b1.clone(),
        Event::observation_for(&b1, "ok").unwrap(),
    ] {
        let _ = state.add_event(e).unwrap();
    }

    let _ = state
        .add_event(Event::condensation(chronicle_core::events::Condensation {
            forgotten_event_ids: vec![a1.id.clone()],
            summary: None,
            summary_offset: None,
            originating_turn_id: None,
        }))
        .unwrap();

    let view = state.view();
    assert!(view.iter().all(|e| e.batch_id().is_none()));
    assert_eq!(view.len(), 1);
}

#[tokio::test]
async fn condensation_shrinks_view_and_summarizes() {
    let state = conversation();
    for i in 0..30 {
        let _ = state.add_event(Event::user_message(format!("m{i}"))).unwrap();
    }
    let condenser = Condenser::new(&thresholds(20, 4), Arc::new(Fixed("they chatted"))).unwrap();

    let id = state.condense_if_needed(&condenser).await.unwrap();
    assert!(id.is_some());

    let view = state.view();
    assert!(view.len() <= 10);
    assert_eq!(view.summary(), Some("they chatted"));
    assert_eq!(state.stats().condensations, 1);

    let wire = to_wire_messages(&view);
    assert_eq!(wire[0].role, WireRole::System);
    assert!(wire.iter().any(|m| m.content.ends_with("they chatted")));

    // The view is small again.
    assert!(state.condense_if_needed(&condenser).await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_request_is_served() {
    let state = conversation();
    for i in 0..12 {
        let _ = state.add_event(Event::user_message(format!("m{i}"))).unwrap();
    }
    let condenser = Condenser::new(&thresholds(100, 1), Arc::new(Fixed("short"))).unwrap();
    assert!(state.condense_if_needed(&condenser).await.unwrap().is_none());

    let _ = state.request_condensation(Some("user asked".into())).unwrap();
    assert!(state.view().unhandled_condensation_request());
    assert!(state.condense_if_needed(&condenser).await.unwrap().is_some());
    assert!(!state.view().unhandled_condensation_request());
}

#[tokio::test]
async fn failed_summary_leaves_view_unchanged() {
    let state = conversation();
    for i in 0..30 {
        let _ = state.add_event(Event::user_message(format!("m{i}"))).unwrap();
    }
    let condenser = Condenser::new(&thresholds(20, 4), Arc::new(Unavailable)).unwrap();
    let before = state.len();

    let err = state.condense_if_needed(&condenser).await.unwrap_err();
    assert_matches!(err, StateError::Context(ContextError::Summarization(_)));
    assert!(err.is_recoverable());
    assert_eq!(state.len(), before);
    assert_eq!(state.view().len(), 31);
}
