//! Agent Core — the orchestration layer.
//!
//! Submodules:
//! - `orchestrator`: The agent loop (LLM call → route → tools → repeat)
//! - `tool_router`: Executes one round of tool calls under the permission model
//! - `tool_table`: Tool metadata (tier, terminal flag, schema) + registry trait
//! - `permissions`: Permission tiers and the shared granted set
//! - `confirmation`: Confirmation policies for gated tool calls
//! - `checkpoint`: Summarize / save / restore when the iteration budget runs out
//! - `conversation`: Conversation history owned by the loop
//! - `events`: Push-only UI callbacks and the event channel
//! - `tokens`: Token estimation and result truncation
//! - `config`: Loop configuration loading (YAML + env interpolation)
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod checkpoint;
pub mod config;
pub mod confirmation;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod permissions;
pub mod tokens;
pub mod tool_router;
pub mod tool_table;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointHandler, CheckpointPhase, CheckpointStore};
pub use config::{find_config_path, load_loop_config, LoopConfig};
pub use confirmation::{AutoApprove, ChannelConfirmation, ConfirmationPolicy, DenyAll, PendingConfirmation};
pub use conversation::Conversation;
pub use errors::{AgentError, ToolError};
pub use events::{AgentEvent, EventSink, NoopSink, UiSink};
pub use orchestrator::AgentLoop;
pub use permissions::{PermissionSet, PermissionStore, Tier};
pub use tool_router::{PendingCall, RoundReport, ToolRouter};
pub use tool_table::{ToolDescriptor, ToolRegistry, ToolTable};
pub use types::{
    ConfirmResult, ConfirmationRequest, LoopState, RunOutcome, RunStatus, ToolOutcomeStatus,
    ToolResult,
};
