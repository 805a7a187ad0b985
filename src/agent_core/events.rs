//! UI events — the push-only channel from the agent loop to a front end.
//!
//! `UiSink` has a no-op default for every method, so a front end only
//! overrides what it renders. `EventSink` turns each callback into a
//! serializable [`AgentEvent`] on an unbounded channel, for front ends that
//! render on another task.

use serde::Serialize;
use tokio::sync::mpsc;

use super::types::ToolResult;
use crate::inference::types::ToolCall;

/// Receives progress from the agent loop. Calls are synchronous and must not
/// block.
pub trait UiSink: Send + Sync {
    fn on_reasoning(&self, _text: &str) {}

    fn on_display_text(&self, _text: &str) {}

    /// Called for every call in a round before any of them runs.
    fn on_tool_start(&self, _call: &ToolCall) {}

    /// Called as each call resolves, in completion order.
    fn on_tool_complete(&self, _result: &ToolResult) {}

    fn on_tools_round_complete(&self) {}

    fn on_system_message(&self, _text: &str) {}

    /// Cumulative tokens for the run so far.
    fn on_token_usage(&self, _total_tokens: u64) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl UiSink for NoopSink {}

// ─── Event Channel ──────────────────────────────────────────────────────────

/// A single UI callback as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Reasoning { text: String },
    DisplayText { text: String },
    ToolStart { call: ToolCall },
    ToolComplete { result: ToolResult },
    ToolsRoundComplete,
    SystemMessage { text: String },
    TokenUsage { total_tokens: u64 },
}

/// Forwards every callback as an [`AgentEvent`].
///
/// A dropped receiver is not an error: events are simply lost.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the front end drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl UiSink for EventSink {
    fn on_reasoning(&self, text: &str) {
        self.send(AgentEvent::Reasoning {
            text: text.to_string(),
        });
    }

    fn on_display_text(&self, text: &str) {
        self.send(AgentEvent::DisplayText {
            text: text.to_string(),
        });
    }

    fn on_tool_start(&self, call: &ToolCall) {
        self.send(AgentEvent::ToolStart { call: call.clone() });
    }

    fn on_tool_complete(&self, result: &ToolResult) {
        self.send(AgentEvent::ToolComplete {
            result: result.clone(),
        });
    }

    fn on_tools_round_complete(&self) {
        self.send(AgentEvent::ToolsRoundComplete);
    }

    fn on_system_message(&self, text: &str) {
        self.send(AgentEvent::SystemMessage {
            text: text.to_string(),
        });
    }

    fn on_token_usage(&self, total_tokens: u64) {
        self.send(AgentEvent::TokenUsage { total_tokens });
    }
}
