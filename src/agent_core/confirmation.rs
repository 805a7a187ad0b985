//! Confirmation — asking the user before a gated tool call runs.
//!
//! The router builds a [`ConfirmationRequest`] for every call whose tier is
//! not granted and awaits the policy's decision. `ChannelConfirmation` hands
//! requests to the front end over an mpsc channel, each with a oneshot reply
//! slot. A closed channel or dropped reply counts as a denial.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::permissions::Tier;
use super::tokens::truncate_utf8;
use super::types::{ConfirmResult, ConfirmationRequest};

/// Decides whether a gated tool call may run.
#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    async fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmResult;
}

/// Approves every call. For headless runs with trusted tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPolicy for AutoApprove {
    async fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmResult {
        tracing::debug!(tool = %request.tool_name, "auto-approving gated call");
        ConfirmResult::Approve
    }
}

/// Denies every call. The agent loop's default until a front end wires a
/// real policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConfirmationPolicy for DenyAll {
    async fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmResult {
        tracing::debug!(tool = %request.tool_name, "no confirmation policy, denying");
        ConfirmResult::Deny
    }
}

// ─── Channel Policy ─────────────────────────────────────────────────────────

/// A confirmation request waiting for the front end's answer.
#[derive(Debug)]
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    reply: oneshot::Sender<ConfirmResult>,
}

impl PendingConfirmation {
    /// Send the decision back to the waiting loop.
    pub fn respond(self, result: ConfirmResult) {
        if self.reply.send(result).is_err() {
            tracing::debug!(
                request_id = %self.request.request_id,
                "confirmation answered after the loop stopped waiting"
            );
        }
    }
}

/// Forwards requests to the front end over a channel.
#[derive(Debug, Clone)]
pub struct ChannelConfirmation {
    tx: mpsc::Sender<PendingConfirmation>,
}

impl ChannelConfirmation {
    /// Create the policy and the receiver the front end answers from.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationPolicy for ChannelConfirmation {
    async fn request_confirmation(&self, request: &ConfirmationRequest) -> ConfirmResult {
        let (reply, answer) = oneshot::channel();
        let pending = PendingConfirmation {
            request: request.clone(),
            reply,
        };

        if self.tx.send(pending).await.is_err() {
            tracing::warn!(
                tool = %request.tool_name,
                "confirmation channel closed, denying"
            );
            return ConfirmResult::Deny;
        }

        match answer.await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tool = %request.tool_name,
                    "confirmation reply dropped, denying"
                );
                ConfirmResult::Deny
            }
        }
    }
}

// ─── Request Building ───────────────────────────────────────────────────────

/// Build the request shown to the user for a gated call.
pub fn build_request(tool_name: &str, arguments: &serde_json::Value, tier: Tier) -> ConfirmationRequest {
    ConfirmationRequest {
        request_id: uuid::Uuid::new_v4().to_string(),
        tool_name: tool_name.to_string(),
        arguments: arguments.clone(),
        tier,
        preview: generate_preview(tool_name, arguments),
        is_destructive: is_destructive_action(tool_name, tier),
    }
}

/// Execute-tier tools and deletions are flagged as destructive.
pub fn is_destructive_action(tool_name: &str, tier: Tier) -> bool {
    tier == Tier::Execute
        || tool_name.starts_with("delete")
        || tool_name.starts_with("remove")
}

/// Generate a human-readable preview for a tool call.
pub fn generate_preview(tool_name: &str, arguments: &serde_json::Value) -> String {
    let arg = |key: &str| -> &str {
        arguments
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>")
    };

    match tool_name {
        "write_file" | "edit_file" | "create_file" => {
            let path = arguments
                .get("file_path")
                .or_else(|| arguments.get("path"))
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>");
            format!("Write to file: {path}")
        }
        "delete_file" => format!("Delete file: {}", arg("path")),
        "move_file" => format!("Move: {} → {}", arg("source"), arg("destination")),
        "run_command" | "execute_command" | "bash" => format!("Run: {}", arg("command")),
        _ => {
            let args_preview = serde_json::to_string(arguments).unwrap_or_default();
            let truncated = if args_preview.len() > 100 {
                format!("{}...", truncate_utf8(&args_preview, 100))
            } else {
                args_preview
            };
            format!("Execute {tool_name}: {truncated}")
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_confirmation_round_trip() {
        let (policy, mut rx) = ChannelConfirmation::channel(4);
        let request = build_request("write_file", &serde_json::json!({"file_path": "a"}), Tier::Write);

        let front_end = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.request.tool_name, "write_file");
            pending.respond(ConfirmResult::instruct("write b instead"));
        });

        let result = policy.request_confirmation(&request).await;
        front_end.await.unwrap();
        assert_eq!(result, ConfirmResult::instruct("write b instead"));
    }

    #[tokio::test]
    async fn test_channel_closed_denies() {
        let (policy, rx) = ChannelConfirmation::channel(1);
        drop(rx);
        let request = build_request("run_command", &serde_json::json!({}), Tier::Execute);
        assert_eq!(policy.request_confirmation(&request).await, ConfirmResult::Deny);
    }

    #[tokio::test]
    async fn test_dropped_reply_denies() {
        let (policy, mut rx) = ChannelConfirmation::channel(1);
        let front_end = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            drop(pending);
        });
        let request = build_request("run_command", &serde_json::json!({}), Tier::Execute);
        assert_eq!(policy.request_confirmation(&request).await, ConfirmResult::Deny);
        front_end.await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_approve() {
        let request = build_request("write_file", &serde_json::json!({}), Tier::Write);
        assert_eq!(AutoApprove.request_confirmation(&request).await, ConfirmResult::Approve);
    }

    #[tokio::test]
    async fn test_deny_all() {
        let request = build_request("write_file", &serde_json::json!({}), Tier::Write);
        assert_eq!(DenyAll.request_confirmation(&request).await, ConfirmResult::Deny);
    }

    #[test]
    fn test_preview_known_tools() {
        assert_eq!(
            generate_preview("write_file", &serde_json::json!({"file_path": "out.txt"})),
            "Write to file: out.txt"
        );
        assert_eq!(
            generate_preview("run_command", &serde_json::json!({"command": "ls"})),
            "Run: ls"
        );
    }

    #[test]
    fn test_preview_generic_is_truncated() {
        let long = "y".repeat(300);
        let preview = generate_preview("custom", &serde_json::json!({ "data": long }));
        assert!(preview.starts_with("Execute custom: "));
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_destructive_flags() {
        assert!(is_destructive_action("run_command", Tier::Execute));
        assert!(is_destructive_action("delete_file", Tier::Write));
        assert!(!is_destructive_action("write_file", Tier::Write));
    }
}
