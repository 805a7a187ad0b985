//! Shared types for the agent core.
//!
//! Confirmation decisions, per-call tool outcomes, loop state and the run
//! outcome returned to the front end.

use serde::{Deserialize, Serialize};

use super::permissions::Tier;

// ─── Confirmation ───────────────────────────────────────────────────────────

/// The user's decision about a gated tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfirmResult {
    /// Run the call.
    Approve,
    /// Don't run this call; keep going with the rest of the round.
    Deny,
    /// Don't run this call, skip the remaining gated calls, and feed the
    /// instructions back to the model.
    Instruct { instructions: String },
}

impl ConfirmResult {
    pub fn instruct(instructions: impl Into<String>) -> Self {
        ConfirmResult::Instruct {
            instructions: instructions.into(),
        }
    }
}

/// Request sent to the front end for user confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    /// Unique request ID for matching responses.
    pub request_id: String,
    /// The tool being called.
    pub tool_name: String,
    /// The arguments to the tool.
    pub arguments: serde_json::Value,
    /// Permission tier that triggered the confirmation.
    pub tier: Tier,
    /// Human-readable preview of what will happen.
    pub preview: String,
    /// Whether this is a destructive action (delete, overwrite, run).
    pub is_destructive: bool,
}

// ─── Tool Outcomes ──────────────────────────────────────────────────────────

/// How a single tool call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcomeStatus {
    /// Tool executed and returned a result.
    Success,
    /// Tool executed (or tried to) and failed.
    Failed,
    /// User denied the call.
    Denied,
    /// Not attempted because the user gave new instructions.
    Skipped,
    /// Arguments could not be parsed; the tool was never invoked.
    Malformed,
}

impl ToolOutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolOutcomeStatus::Success => "success",
            ToolOutcomeStatus::Failed => "failed",
            ToolOutcomeStatus::Denied => "denied",
            ToolOutcomeStatus::Skipped => "skipped",
            ToolOutcomeStatus::Malformed => "malformed",
        }
    }
}

/// The result of one tool call, correlated to its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub status: ToolOutcomeStatus,
    /// Text fed back to the model.
    pub content: String,
    pub execution_time_ms: u64,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.status == ToolOutcomeStatus::Success
    }
}

// ─── Loop State ─────────────────────────────────────────────────────────────

/// Mutable per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopState {
    /// Main-loop LLM calls since the run started or the last restore.
    pub iteration: u32,
    pub total_tokens: u64,
    pub cancelled: bool,
    /// Completed checkpoint cycles.
    pub checkpoints: u32,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model produced a final answer.
    Completed,
    /// A terminal tool executed successfully.
    TerminalTool,
    /// The cancellation token fired.
    Cancelled,
    /// The iteration budget ran out with no way to checkpoint.
    MaxIterations,
    /// The provider returned an error.
    ProviderError,
}

/// What `AgentLoop::run` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Display text of the final answer, when there was one.
    pub final_text: Option<String>,
    /// Iteration counter at the end of the run.
    pub iterations: u32,
    pub total_tokens: u64,
    pub checkpoints: u32,
}

impl RunOutcome {
    pub(crate) fn from_state(status: RunStatus, state: &LoopState, final_text: Option<String>) -> Self {
        Self {
            status,
            final_text,
            iterations: state.iteration,
            total_tokens: state.total_tokens,
            checkpoints: state.checkpoints,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
