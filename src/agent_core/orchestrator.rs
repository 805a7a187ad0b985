//! Agent loop — drives a conversation between the model and the tools.
//!
//! Each iteration: check cancellation, check the iteration budget, call the
//! model, append its reply, surface reasoning and display text, then route.
//! Routing tries structured tool calls, then tag-based calls, then a JSON
//! array, and otherwise treats the reply as the final answer.
//!
//! Tool results go back differently depending on where the calls came from.
//! Structured calls get one `tool` message each, correlated by id. Calls
//! parsed out of text get a single user message of `[name] result` lines,
//! because the model never saw an id for them.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::inference::content;
use crate::inference::provider::LlmProvider;
use crate::inference::tool_call_parser::parse_native_json_tool_call;
use crate::inference::types::{ChatRequest, ChatResponse, ToolCallResponse};
use crate::inference::InferenceError;

use super::checkpoint::{CheckpointHandler, CheckpointStore, CompactionContext};
use super::config::LoopConfig;
use super::confirmation::{ConfirmationPolicy, DenyAll};
use super::conversation::Conversation;
use super::events::{NoopSink, UiSink};
use super::permissions::PermissionStore;
use super::tool_router::{PendingCall, RoundReport, ToolRouter};
use super::tool_table::{ToolRegistry, ToolTable};
use super::types::{LoopState, RunOutcome, RunStatus};

/// Where a round's calls came from, which decides how results are fed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallSource {
    Structured,
    Text,
}

// ─── AgentLoop ──────────────────────────────────────────────────────────────

/// One agent: a provider, a tool set, collaborators, and the conversation.
///
/// The loop owns the conversation. Front ends seed it with
/// [`with_conversation`](Self::with_conversation) or add turns through
/// [`submit`](Self::submit).
pub struct AgentLoop {
    config: LoopConfig,
    provider: Arc<dyn LlmProvider>,
    router: ToolRouter,
    confirmation: Arc<dyn ConfirmationPolicy>,
    sink: Arc<dyn UiSink>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    permissions: PermissionStore,
    cancel: CancellationToken,
    conversation: Conversation,
    handler: CheckpointHandler,
    state: LoopState,
}

impl AgentLoop {
    /// Build a loop with no checkpoint store, no UI, and a confirmation
    /// policy that denies every gated call.
    pub fn new(
        config: LoopConfig,
        provider: Arc<dyn LlmProvider>,
        registry: Arc<dyn ToolRegistry>,
        table: ToolTable,
    ) -> Self {
        let router = ToolRouter::new(registry, Arc::new(table))
            .with_max_result_chars(config.max_tool_result_chars)
            .with_timeout(config.tool_timeout());
        let permissions = PermissionStore::new(config.granted_permissions.clone());

        Self {
            config,
            provider,
            router,
            confirmation: Arc::new(DenyAll),
            sink: Arc::new(NoopSink),
            checkpoints: None,
            permissions,
            cancel: CancellationToken::new(),
            conversation: Conversation::new(),
            handler: CheckpointHandler::new(),
            state: LoopState::default(),
        }
    }

    pub fn with_confirmation(mut self, policy: Arc<dyn ConfirmationPolicy>) -> Self {
        self.confirmation = policy;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enable compaction when the iteration budget runs out.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Share a permission store with the front end so grants made mid-run
    /// apply from the next tool round.
    pub fn with_permission_store(mut self, permissions: PermissionStore) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// Counters of the current (or last) run.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Handle for granting or revoking tiers while the loop runs.
    pub fn permissions(&self) -> PermissionStore {
        self.permissions.clone()
    }

    /// Token that stops the loop at the next check or mid-call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ─── Run ────────────────────────────────────────────────────────────

    /// Append a user turn and run until the model is done.
    pub async fn submit(&mut self, user_input: impl Into<String>) -> RunOutcome {
        self.conversation.push_user(user_input);
        self.run().await
    }

    /// Run the loop over the current conversation.
    ///
    /// Never fails: provider errors, exhausted budgets and cancellation are
    /// all reported through [`RunOutcome::status`].
    pub async fn run(&mut self) -> RunOutcome {
        self.state = LoopState::default();
        let tools = if self.config.tools_enabled {
            self.router.schemas()
        } else {
            Vec::new()
        };

        tracing::info!(
            model = %self.config.model,
            max_iterations = self.config.max_iterations,
            tools = tools.len(),
            messages = self.conversation.len(),
            "agent run started"
        );

        loop {
            // ── Cancellation ──
            if self.cancel.is_cancelled() {
                return self.cancelled();
            }

            // ── Iteration budget ──
            if self.state.iteration > self.config.max_iterations {
                if let Some(outcome) = self.handle_overflow().await {
                    return outcome;
                }
                continue;
            }

            // ── LLM call ──
            let round = self.state.iteration + 1;
            let estimated_tokens = self.conversation.estimated_tokens();
            tracing::info!(
                round,
                message_count = self.conversation.len(),
                estimated_tokens,
                "sending conversation to model"
            );
            if estimated_tokens > u64::from(self.config.context_window) {
                tracing::warn!(
                    estimated_tokens,
                    context_window = self.config.context_window,
                    "conversation may exceed the context window"
                );
            }

            let request = ChatRequest {
                messages: self.conversation.messages(),
                model: &self.config.model,
                tools: &tools,
                context_window: self.config.context_window,
            };
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self.provider.chat(request) => Some(result),
            };
            let Some(result) = result else {
                tracing::info!(round, "cancelled during model call");
                return self.cancelled();
            };
            self.state.iteration = round;

            let response = match result {
                Ok(response) => response,
                Err(e) => return self.provider_failed(e),
            };
            self.record_usage(&response);

            // ── Append and surface ──
            self.conversation
                .push_assistant(response.content.clone(), response.tool_calls.clone());

            let processed = content::process(response.content.as_deref().unwrap_or(""));
            for segment in &processed.reasoning {
                self.sink.on_reasoning(segment);
            }
            if !processed.display.is_empty() {
                self.sink.on_display_text(&processed.display);
            }

            // ── Route ──
            let (calls, source) = match response.structured_calls() {
                Some(structured) => (decode_structured(structured), CallSource::Structured),
                None => {
                    let parsed = processed.tool_calls;
                    if parsed.is_empty() {
                        tracing::info!(
                            round,
                            total_tokens = self.state.total_tokens,
                            "model produced final answer"
                        );
                        let final_text = Some(processed.display).filter(|d| !d.is_empty());
                        return self.finish(RunStatus::Completed, final_text);
                    }
                    let calls = parsed.into_iter().map(PendingCall::from).collect();
                    (calls, CallSource::Text)
                }
            };

            tracing::info!(
                round,
                tool_calls_count = calls.len(),
                source = ?source,
                "executing tool calls"
            );

            let granted = self.permissions.snapshot();
            let report = self
                .router
                .execute_round(calls, &granted, self.confirmation.as_ref(), self.sink.as_ref())
                .await;

            let terminal = report.terminal_executed;
            self.append_round(report, source);

            if terminal {
                tracing::info!(round, "terminal tool executed, ending run");
                return self.finish(RunStatus::TerminalTool, None);
            }
        }
    }

    // ─── Steps ──────────────────────────────────────────────────────────

    /// Compact and restore, or end the run. `None` means the loop continues.
    async fn handle_overflow(&mut self) -> Option<RunOutcome> {
        let max = self.config.max_iterations;
        tracing::warn!(
            iteration = self.state.iteration,
            max_iterations = max,
            "iteration budget exhausted"
        );

        let Some(store) = self.checkpoints.clone() else {
            return Some(self.exhausted());
        };

        let granted = self.permissions.snapshot();
        let ctx = CompactionContext {
            model: &self.config.model,
            context_window: self.config.context_window,
            permissions: &granted,
        };
        let compaction = self.handler.compact(
            store.as_ref(),
            self.provider.as_ref(),
            &mut self.conversation,
            ctx,
        );
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = compaction => Some(result),
        };

        match result {
            None => Some(self.cancelled()),
            Some(Ok(report)) => {
                self.state.iteration = 0;
                self.state.checkpoints += 1;
                if let Some(tokens) = report.summary_tokens {
                    self.state.total_tokens += tokens;
                    self.sink.on_token_usage(self.state.total_tokens);
                }
                self.sink
                    .on_system_message("Context compacted from a checkpoint. Continuing the task.");
                None
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "checkpoint failed, ending run");
                Some(self.exhausted())
            }
        }
    }

    /// Add provider-reported usage. Responses without usage leave the total
    /// unchanged.
    fn record_usage(&mut self, response: &ChatResponse) {
        let Some(reported) = response.usage.and_then(|u| u.total_tokens) else {
            tracing::debug!(iteration = self.state.iteration, "provider reported no usage");
            return;
        };
        self.state.total_tokens += reported;
        self.sink.on_token_usage(self.state.total_tokens);
    }

    /// Feed a round's results (and any new instructions) back to the model.
    fn append_round(&mut self, report: RoundReport, source: CallSource) {
        match source {
            CallSource::Structured => {
                for result in report.results {
                    self.conversation
                        .push_tool_result(result.call_id, result.name, result.content);
                }
            }
            CallSource::Text => {
                let combined = report
                    .results
                    .iter()
                    .map(|r| format!("[{}] {}", r.name, r.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.conversation.push_user(combined);
            }
        }

        if let Some(instructions) = report.instructions {
            tracing::info!("user redirected the model with new instructions");
            self.conversation.push_user(instructions);
        }
    }

    fn provider_failed(&mut self, error: InferenceError) -> RunOutcome {
        tracing::error!(
            error = %error,
            iteration = self.state.iteration,
            "model call failed"
        );
        self.sink.on_system_message(&format!("LLM error: {error}"));
        self.finish(RunStatus::ProviderError, None)
    }

    fn exhausted(&mut self) -> RunOutcome {
        self.sink.on_system_message(&format!(
            "Maximum iterations reached ({}). Stopping here; send a new message to continue.",
            self.config.max_iterations
        ));
        self.finish(RunStatus::MaxIterations, None)
    }

    fn cancelled(&mut self) -> RunOutcome {
        self.state.cancelled = true;
        self.finish(RunStatus::Cancelled, None)
    }

    fn finish(&self, status: RunStatus, final_text: Option<String>) -> RunOutcome {
        tracing::info!(
            status = ?status,
            iterations = self.state.iteration,
            total_tokens = self.state.total_tokens,
            checkpoints = self.state.checkpoints,
            "agent run finished"
        );
        RunOutcome::from_state(status, &self.state, final_text)
    }
}

/// Decode provider tool calls; undecodable arguments become malformed calls
/// answered locally.
fn decode_structured(calls: &[ToolCallResponse]) -> Vec<PendingCall> {
    calls
        .iter()
        .map(|tc| {
            match parse_native_json_tool_call(Some(&tc.id), &tc.function.name, &tc.function.arguments) {
                Ok(call) => PendingCall::Ready(call),
                Err(e) => {
                    let reason = match e {
                        InferenceError::ToolCallParseError { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    PendingCall::Malformed {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        reason,
                    }
                }
            }
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
