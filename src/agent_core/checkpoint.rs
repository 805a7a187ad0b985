//! Checkpoints — compacting the conversation when the iteration budget runs
//! out.
//!
//! On overflow the handler moves from `Normal` to `Compacting`. If the store
//! already holds a checkpoint it restores straight away. Otherwise it asks
//! the model for a summary (tools disabled), appends the exchange, saves it,
//! and then restores. Restore shrinks the conversation to the system prompt
//! plus one resume message; the loop then starts counting iterations from 0.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::inference::provider::LlmProvider;
use crate::inference::types::{ChatMessage, ChatRequest};

use super::conversation::{reset_keeping_system, Conversation};
use super::errors::AgentError;
use super::permissions::PermissionSet;

/// Synthetic user turn that asks the model to summarize its progress.
pub const SUMMARY_INSTRUCTION: &str = "The iteration limit for this task has been reached. \
Summarize the work so far so it can be resumed from a fresh context: the original goal, \
what has been done, files touched, key findings, and the concrete next steps. \
Reply with the summary only and do not call any tools.";

// ─── Types ──────────────────────────────────────────────────────────────────

/// A saved summary of a run. Opaque to the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persists checkpoints and rebuilds the conversation from them.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Whether a checkpoint is already available to restore from.
    fn has_saved_checkpoint(&self) -> bool;

    /// Save the conversation, which ends with the summary exchange.
    async fn save_checkpoint(
        &self,
        conversation: &[ChatMessage],
        model: &str,
        context_window: u32,
        permissions: &PermissionSet,
    ) -> Result<Checkpoint, AgentError>;

    /// Text of the user message that resumes the run after restore.
    fn build_restore_message(&self) -> String;

    /// Rebuild the conversation in place. The default keeps the leading
    /// system message and adds one user message from
    /// [`build_restore_message`](Self::build_restore_message).
    fn restore(&self, conversation: &mut Vec<ChatMessage>) {
        reset_keeping_system(conversation, ChatMessage::user(self.build_restore_message()));
    }
}

/// Handler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckpointPhase {
    #[default]
    Normal,
    Compacting,
}

/// Run parameters passed through to `save_checkpoint`.
#[derive(Debug, Clone, Copy)]
pub struct CompactionContext<'a> {
    pub model: &'a str,
    pub context_window: u32,
    pub permissions: &'a PermissionSet,
}

/// What a successful compaction did.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionReport {
    /// The checkpoint saved during this cycle; `None` when an existing one
    /// was restored.
    pub saved: Option<Checkpoint>,
    /// Tokens the provider reported for the summarization call.
    pub summary_tokens: Option<u64>,
}

// ─── Handler ────────────────────────────────────────────────────────────────

/// Drives one overflow → compact → restore cycle.
#[derive(Debug, Default)]
pub struct CheckpointHandler {
    phase: CheckpointPhase,
}

impl CheckpointHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CheckpointPhase {
        self.phase
    }

    /// Summarize (if needed), save and restore. The phase is back to
    /// `Normal` whether this succeeds or not.
    pub async fn compact(
        &mut self,
        store: &dyn CheckpointStore,
        provider: &dyn LlmProvider,
        conversation: &mut Conversation,
        ctx: CompactionContext<'_>,
    ) -> Result<CompactionReport, AgentError> {
        self.phase = CheckpointPhase::Compacting;
        tracing::info!(messages = conversation.len(), "compacting conversation");

        let result = Self::summarize_and_restore(store, provider, conversation, ctx).await;

        self.phase = CheckpointPhase::Normal;
        match &result {
            Ok(report) => tracing::info!(
                checkpoint_id = report.saved.as_ref().map(|c| c.id.as_str()).unwrap_or("existing"),
                messages = conversation.len(),
                "conversation restored from checkpoint"
            ),
            Err(e) => tracing::warn!(error = %e, "checkpoint cycle failed"),
        }
        result
    }

    async fn summarize_and_restore(
        store: &dyn CheckpointStore,
        provider: &dyn LlmProvider,
        conversation: &mut Conversation,
        ctx: CompactionContext<'_>,
    ) -> Result<CompactionReport, AgentError> {
        let mut report = CompactionReport {
            saved: None,
            summary_tokens: None,
        };

        if !store.has_saved_checkpoint() {
            let mut request_messages = conversation.messages().to_vec();
            request_messages.push(ChatMessage::user(SUMMARY_INSTRUCTION));

            let response = provider
                .chat(ChatRequest {
                    messages: &request_messages,
                    model: ctx.model,
                    tools: &[],
                    context_window: ctx.context_window,
                })
                .await
                .map_err(|e| AgentError::CheckpointError {
                    reason: format!("summarization call failed: {e}"),
                })?;

            let summary = response.content.clone().unwrap_or_default();
            if summary.trim().is_empty() {
                return Err(AgentError::CheckpointError {
                    reason: "model returned an empty summary".into(),
                });
            }
            report.summary_tokens = response.usage.and_then(|u| u.total_tokens);

            // The live conversation is only touched once the save succeeds.
            request_messages.push(ChatMessage::assistant(Some(summary), None));
            let checkpoint = store
                .save_checkpoint(
                    &request_messages,
                    ctx.model,
                    ctx.context_window,
                    ctx.permissions,
                )
                .await?;
            tracing::debug!(checkpoint_id = %checkpoint.id, "checkpoint saved");
            *conversation.messages_mut() = request_messages;
            report.saved = Some(checkpoint);
        }

        store.restore(conversation.messages_mut());
        Ok(report)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
