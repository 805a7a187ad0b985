//! ToolRouter — executes one round of model tool calls.
//!
//! The ToolRouter is the bridge between the model's tool call decisions and
//! the `ToolRegistry`. For each round it handles:
//! - Malformed calls (unparseable arguments) — answered without running
//! - Partitioning into auto-approved and gated calls by permission tier
//! - Parallel execution of auto calls on blocking worker threads
//! - Sequential confirmation + execution of gated calls
//! - Validation, timeouts and result truncation per call
//!
//! Results are returned in the original call order, whatever order the
//! calls finished in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::inference::types::{ToolCall, ToolDefinition};

use super::confirmation::{build_request, ConfirmationPolicy};
use super::events::UiSink;
use super::permissions::PermissionSet;
use super::tokens::truncate_tool_result;
use super::tool_table::{ToolRegistry, ToolTable};
use super::types::{ConfirmResult, ToolOutcomeStatus, ToolResult};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default cap on a single tool result fed back to the model.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 6_000;

// ─── Round Input / Output ───────────────────────────────────────────────────

/// A tool call as it enters a round.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingCall {
    /// Arguments decoded, ready to dispatch.
    Ready(ToolCall),
    /// Arguments could not be decoded. Never reaches the tool.
    Malformed {
        id: String,
        name: String,
        reason: String,
    },
}

impl PendingCall {
    pub fn id(&self) -> &str {
        match self {
            PendingCall::Ready(call) => &call.id,
            PendingCall::Malformed { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PendingCall::Ready(call) => &call.name,
            PendingCall::Malformed { name, .. } => name,
        }
    }

    /// The call as announced to the UI. Malformed calls show empty arguments.
    fn announced(&self) -> ToolCall {
        match self {
            PendingCall::Ready(call) => call.clone(),
            PendingCall::Malformed { id, name, .. } => ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: serde_json::json!({}),
            },
        }
    }
}

impl From<ToolCall> for PendingCall {
    fn from(call: ToolCall) -> Self {
        PendingCall::Ready(call)
    }
}

/// Everything a finished round produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    /// One result per input call, in input order.
    pub results: Vec<ToolResult>,
    /// Set when the user answered a confirmation with new instructions.
    pub instructions: Option<String>,
    /// A terminal tool executed successfully in this round.
    pub terminal_executed: bool,
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Dispatches tool calls to the registry under the permission model.
pub struct ToolRouter {
    registry: Arc<dyn ToolRegistry>,
    table: Arc<ToolTable>,
    max_result_chars: usize,
    timeout: Option<Duration>,
}

impl ToolRouter {
    pub fn new(registry: Arc<dyn ToolRegistry>, table: Arc<ToolTable>) -> Self {
        Self {
            registry,
            table,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
            timeout: None,
        }
    }

    /// Cap result text at `max` bytes (`0` disables the cap).
    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &ToolTable {
        &self.table
    }

    /// Schemas advertised to the model. A registry that publishes none falls
    /// back to the definitions built from the tool table.
    pub fn schemas(&self) -> Vec<ToolDefinition> {
        let schemas = self.registry.schemas();
        if schemas.is_empty() {
            return self.table.definitions();
        }
        schemas
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Execute one round of tool calls.
    ///
    /// Every call is announced before any runs. Auto calls run concurrently;
    /// gated calls then run one at a time after confirmation. An `instruct`
    /// answer stops the gated sequence: the current call is denied and the
    /// rest are skipped.
    pub async fn execute_round(
        &self,
        calls: Vec<PendingCall>,
        granted: &PermissionSet,
        confirmation: &dyn ConfirmationPolicy,
        sink: &dyn UiSink,
    ) -> RoundReport {
        for call in &calls {
            sink.on_tool_start(&call.announced());
        }

        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut auto: Vec<(usize, &ToolCall)> = Vec::new();
        let mut gated: Vec<(usize, &ToolCall)> = Vec::new();

        for (idx, call) in calls.iter().enumerate() {
            match call {
                PendingCall::Malformed { id, name, reason } => {
                    let result = resolved(
                        id,
                        name,
                        ToolOutcomeStatus::Malformed,
                        format!("Error: could not parse arguments for '{name}': {reason}"),
                    );
                    tracing::warn!(tool = %name, reason = %reason, "malformed tool call");
                    sink.on_tool_complete(&result);
                    slots[idx] = Some(result);
                }
                PendingCall::Ready(call) if self.table.needs_confirmation(&call.name, granted) => {
                    gated.push((idx, call));
                }
                PendingCall::Ready(call) => auto.push((idx, call)),
            }
        }

        tracing::debug!(
            total = calls.len(),
            auto = auto.len(),
            gated = gated.len(),
            "tool round partitioned"
        );

        // Auto calls: all at once
        let auto_futures = auto.into_iter().map(|(idx, call)| async move {
            let result = self.execute_call(call).await;
            sink.on_tool_complete(&result);
            (idx, result)
        });
        for (idx, result) in join_all(auto_futures).await {
            slots[idx] = Some(result);
        }

        // Gated calls: one at a time
        let mut instructions = None;
        let mut gated_iter = gated.into_iter();
        while let Some((idx, call)) = gated_iter.next() {
            let request = build_request(&call.name, &call.arguments, self.table.tier(&call.name));
            let decision = confirmation.request_confirmation(&request).await;
            tracing::info!(tool = %call.name, decision = ?decision, "confirmation answered");

            let result = match decision {
                ConfirmResult::Approve => self.execute_call(call).await,
                ConfirmResult::Deny => denied(call),
                ConfirmResult::Instruct { instructions: text } => {
                    let result = denied(call);
                    sink.on_tool_complete(&result);
                    slots[idx] = Some(result);

                    for (skip_idx, skipped_call) in gated_iter.by_ref() {
                        let skipped = resolved(
                            &skipped_call.id,
                            &skipped_call.name,
                            ToolOutcomeStatus::Skipped,
                            format!(
                                "Tool call '{}' was skipped because the user provided new instructions.",
                                skipped_call.name
                            ),
                        );
                        sink.on_tool_complete(&skipped);
                        slots[skip_idx] = Some(skipped);
                    }
                    instructions = Some(text);
                    break;
                }
            };
            sink.on_tool_complete(&result);
            slots[idx] = Some(result);
        }

        sink.on_tools_round_complete();

        let results: Vec<ToolResult> = slots.into_iter().flatten().collect();
        let terminal_executed = results
            .iter()
            .any(|r| r.is_success() && self.table.is_terminal(&r.name));

        RoundReport {
            results,
            instructions,
            terminal_executed,
        }
    }

    // ─── Execution ──────────────────────────────────────────────────────

    /// Validate and run a single call on a blocking worker.
    async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();

        if let Err(e) = self.table.validate_arguments(&call.name, &call.arguments) {
            return self.finish(call, start, ToolOutcomeStatus::Failed, format!("Error: {e}"));
        }

        let registry = Arc::clone(&self.registry);
        let name = call.name.clone();
        let arguments = call.arguments.clone();
        let handle = tokio::task::spawn_blocking(move || registry.execute(&name, &arguments));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    return self.finish(
                        call,
                        start,
                        ToolOutcomeStatus::Failed,
                        format!(
                            "Error: tool '{}' timed out after {}s",
                            call.name,
                            limit.as_secs()
                        ),
                    );
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(output)) => self.finish(
                call,
                start,
                ToolOutcomeStatus::Success,
                truncate_tool_result(&output, self.max_result_chars),
            ),
            Ok(Err(e)) => self.finish(call, start, ToolOutcomeStatus::Failed, format!("Error: {e}")),
            Err(join_err) => self.finish(
                call,
                start,
                ToolOutcomeStatus::Failed,
                format!("Error: tool '{}' crashed: {join_err}", call.name),
            ),
        }
    }

    fn finish(
        &self,
        call: &ToolCall,
        start: Instant,
        status: ToolOutcomeStatus,
        content: String,
    ) -> ToolResult {
        let elapsed = start.elapsed().as_millis() as u64;
        if status == ToolOutcomeStatus::Success {
            tracing::info!(tool = %call.name, duration_ms = elapsed, "tool executed");
        } else {
            tracing::warn!(
                tool = %call.name,
                duration_ms = elapsed,
                status = status.as_str(),
                "tool failed"
            );
        }
        ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            status,
            content,
            execution_time_ms: elapsed,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn resolved(id: &str, name: &str, status: ToolOutcomeStatus, content: String) -> ToolResult {
    ToolResult {
        call_id: id.to_string(),
        name: name.to_string(),
        status,
        content,
        execution_time_ms: 0,
    }
}

fn denied(call: &ToolCall) -> ToolResult {
    resolved(
        &call.id,
        &call.name,
        ToolOutcomeStatus::Denied,
        format!("Tool call '{}' was denied by the user.", call.name),
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────
