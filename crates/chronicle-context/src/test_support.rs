//! Event builders shared by this crate's tests.

use std::sync::Arc;

use chronicle_core::content::ReasoningBlock;
use chronicle_core::events::Event;
use chronicle_core::ids::{BatchId, ToolCallId};
use chronicle_core::payload::ToolPayload;

pub(crate) fn action(batch: &BatchId, call: &str) -> Event {
    Event::action(
        batch.clone(),
        ToolCallId::from_string(call.to_string()),
        "terminal",
        ToolPayload::new("terminal.command", serde_json::json!({"cmd": call})),
    )
}

pub(crate) fn reasoning_action(batch: &BatchId, call: &str) -> Event {
    action(batch, call).with_reasoning(vec![ReasoningBlock::thinking("let me check")])
}

pub(crate) fn observe(action: &Event) -> Event {
    Event::observation_for(action, "ok").unwrap()
}

pub(crate) fn fail(action: &Event) -> Event {
    Event::agent_error_for(action, "crashed", false).unwrap()
}

pub(crate) fn arcs(events: Vec<Event>) -> Vec<Arc<Event>> {
    events.into_iter().map(Arc::new).collect()
}

pub(crate) fn messages(n: usize) -> Vec<Event> {
    (0..n).map(|i| Event::user_message(format!("message {i}"))).collect()
}
