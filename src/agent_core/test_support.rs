//! Scripted collaborators shared by the agent_core unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::inference::provider::LlmProvider;
use crate::inference::types::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall, ToolDefinition};
use crate::inference::InferenceError;

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::confirmation::ConfirmationPolicy;
use super::conversation::reset_keeping_system;
use super::errors::{AgentError, ToolError};
use super::events::{AgentEvent, UiSink};
use super::permissions::{PermissionSet, Tier};
use super::tool_table::{ToolDescriptor, ToolRegistry, ToolTable};
use super::types::{ConfirmResult, ConfirmationRequest, ToolResult};

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// read_file, list_dir, search (r); write_file (w); run_command (x);
/// attempt_completion (r, terminal).
pub fn sample_table() -> ToolTable {
    ToolTable::builder()
        .register(
            ToolDescriptor::new("read_file", Tier::Read)
                .description("Read a file")
                .parameters(serde_json::json!({
                    "type": "object",
                    "properties": { "file_path": { "type": "string" } },
                    "required": ["file_path"]
                })),
        )
        .register(ToolDescriptor::new("list_dir", Tier::Read).description("List a directory"))
        .register(ToolDescriptor::new("search", Tier::Read).description("Search files"))
        .register(ToolDescriptor::new("write_file", Tier::Write).description("Write a file"))
        .register(ToolDescriptor::new("run_command", Tier::Execute).description("Run a shell command"))
        .register(
            ToolDescriptor::new("attempt_completion", Tier::Read)
                .description("Finish the task")
                .terminal(),
        )
        .build()
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// Returns canned results per tool name. Unknown names fail.
#[derive(Default)]
pub struct ScriptedRegistry {
    responses: HashMap<String, Result<String, String>>,
    panics: HashSet<String>,
    delay: Option<Duration>,
    delays: HashMap<String, Duration>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, name: &str, result: Result<String, String>) -> Self {
        self.responses.insert(name.to_string(), result);
        self
    }

    pub fn panic_on(mut self, name: &str) -> Self {
        self.panics.insert(name.to_string());
        self
    }

    /// Sleep this long inside every execution.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep this long inside executions of `name`, overriding [`Self::delay`].
    pub fn delay_for(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Names of the tools actually executed, in execution order.
    pub fn executed_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl ToolRegistry for ScriptedRegistry {
    fn schemas(&self) -> Vec<ToolDefinition> {
        sample_table().definitions()
    }

    fn execute(&self, name: &str, _arguments: &serde_json::Value) -> Result<String, ToolError> {
        self.executed.lock().unwrap().push(name.to_string());
        if let Some(delay) = self.delays.get(name).copied().or(self.delay) {
            std::thread::sleep(delay);
        }
        if self.panics.contains(name) {
            panic!("scripted panic in {name}");
        }
        match self.responses.get(name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(reason)) => Err(ToolError::failed(reason.clone())),
            None => Err(ToolError::UnknownTool {
                name: name.to_string(),
            }),
        }
    }
}

// ─── Confirmation ───────────────────────────────────────────────────────────

/// Answers confirmations from a script; denies once the script runs out.
pub struct ScriptedConfirmation {
    answers: Mutex<VecDeque<ConfirmResult>>,
    asked: AtomicUsize,
}

impl ScriptedConfirmation {
    pub fn new(answers: Vec<ConfirmResult>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationPolicy for ScriptedConfirmation {
    async fn request_confirmation(&self, _request: &ConfirmationRequest) -> ConfirmResult {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConfirmResult::Deny)
    }
}

// ─── UI Sink ────────────────────────────────────────────────────────────────

/// Records every callback as an [`AgentEvent`].
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&AgentEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(*e)).count()
    }

    pub fn starts(&self) -> usize {
        self.count(|e| matches!(e, AgentEvent::ToolStart { .. }))
    }

    pub fn completes(&self) -> usize {
        self.count(|e| matches!(e, AgentEvent::ToolComplete { .. }))
    }

    pub fn rounds(&self) -> usize {
        self.count(|e| matches!(e, AgentEvent::ToolsRoundComplete))
    }

    pub fn system_messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::SystemMessage { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn display_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::DisplayText { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn reasoning(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::Reasoning { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn token_usage(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::TokenUsage { total_tokens } => Some(total_tokens),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: AgentEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl UiSink for RecordingSink {
    fn on_reasoning(&self, text: &str) {
        self.push(AgentEvent::Reasoning { text: text.into() });
    }

    fn on_display_text(&self, text: &str) {
        self.push(AgentEvent::DisplayText { text: text.into() });
    }

    fn on_tool_start(&self, call: &ToolCall) {
        self.push(AgentEvent::ToolStart { call: call.clone() });
    }

    fn on_tool_complete(&self, result: &ToolResult) {
        self.push(AgentEvent::ToolComplete {
            result: result.clone(),
        });
    }

    fn on_tools_round_complete(&self) {
        self.push(AgentEvent::ToolsRoundComplete);
    }

    fn on_system_message(&self, text: &str) {
        self.push(AgentEvent::SystemMessage { text: text.into() });
    }

    fn on_token_usage(&self, total_tokens: u64) {
        self.push(AgentEvent::TokenUsage { total_tokens });
    }
}

// ─── Provider ───────────────────────────────────────────────────────────────

/// What the provider saw on one call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_count: usize,
}

/// Replays responses in order. An exhausted script is a provider error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ChatResponse, InferenceError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    cancel_on: Option<(usize, CancellationToken)>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ChatResponse, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            cancel_on: None,
        }
    }

    /// On the `index`-th call (0-based), cancel `token` and never answer.
    pub fn cancel_on_call(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((index, token));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, InferenceError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(RecordedRequest {
                messages: request.messages.to_vec(),
                tool_count: request.tools.len(),
            });
            requests.len() - 1
        };

        if let Some((cancel_index, token)) = &self.cancel_on {
            if *cancel_index == index {
                token.cancel();
                futures::future::pending::<()>().await;
            }
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(InferenceError::Provider {
                reason: "script exhausted".into(),
            })
        })
    }
}

// ─── Checkpoint Store ───────────────────────────────────────────────────────

/// Keeps checkpoints in memory. The restore message quotes the latest
/// summary.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    existing: Mutex<Option<String>>,
    latest: Mutex<Option<Checkpoint>>,
    saved: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a checkpoint with `summary` was saved by an earlier run.
    pub fn with_existing(summary: &str) -> Self {
        Self {
            existing: Mutex::new(Some(summary.to_string())),
            ..Self::default()
        }
    }

    /// Every save fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn saved_conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    fn has_saved_checkpoint(&self) -> bool {
        self.existing.lock().unwrap().is_some()
    }

    async fn save_checkpoint(
        &self,
        conversation: &[ChatMessage],
        _model: &str,
        _context_window: u32,
        _permissions: &PermissionSet,
    ) -> Result<Checkpoint, AgentError> {
        if self.fail {
            return Err(AgentError::CheckpointError {
                reason: "disk full".into(),
            });
        }
        let summary = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text_content().to_string())
            .unwrap_or_default();
        let checkpoint = Checkpoint::new(summary);
        self.saved.lock().unwrap().push(conversation.to_vec());
        *self.latest.lock().unwrap() = Some(checkpoint.clone());
        Ok(checkpoint)
    }

    fn build_restore_message(&self) -> String {
        let summary = self
            .existing
            .lock()
            .unwrap()
            .clone()
            .or_else(|| self.latest.lock().unwrap().as_ref().map(|c| c.summary.clone()))
            .unwrap_or_default();
        format!("Resuming from a checkpoint. Summary of the work so far:\n\n{summary}\n\nContinue the task.")
    }

    fn restore(&self, conversation: &mut Vec<ChatMessage>) {
        let message = self.build_restore_message();
        self.existing.lock().unwrap().take();
        reset_keeping_system(conversation, ChatMessage::user(message));
    }
}
