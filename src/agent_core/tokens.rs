//! Token estimation and output size limits.
//!
//! Character-based heuristics, used when the provider reports no usage:
//! - prose: ~3.2 chars/token (overestimates on purpose)
//! - JSON/structured content: ~2.8 chars/token

use crate::inference::types::{ChatMessage, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for English prose.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Average characters per token for JSON/structured content.
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-message overhead (role label, formatting tokens).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u32 = 10;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cap a tool result at `max_bytes`, appending a notice when cut.
///
/// `max_bytes == 0` disables the cap.
pub fn truncate_tool_result(result: &str, max_bytes: usize) -> String {
    if max_bytes == 0 || result.len() <= max_bytes {
        return result.to_string();
    }
    let kept = truncate_utf8(result, max_bytes);
    format!(
        "{kept}\n\n[output truncated: showing {} of {} bytes]",
        kept.len(),
        result.len()
    )
}

// ─── Estimation ─────────────────────────────────────────────────────────────

/// Estimate the token count for a string of natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.len() as f64;
    (chars / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for JSON/structured content.
pub fn estimate_json_tokens(json_text: &str) -> u32 {
    let chars = json_text.len() as f64;
    (chars / JSON_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for a `ChatMessage`.
///
/// Tool results and call arguments use the JSON ratio; everything else the
/// prose ratio.
pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
    let mut total = MESSAGE_OVERHEAD_TOKENS;

    if let Some(ref content) = message.content {
        total += match message.role {
            Role::Tool => estimate_json_tokens(content),
            _ => estimate_tokens(content),
        };
    }

    if let Some(ref calls) = message.tool_calls {
        for call in calls {
            total += TOOL_CALL_OVERHEAD_TOKENS;
            total += estimate_tokens(&call.function.name);
            total += estimate_json_tokens(&call.function.arguments);
        }
    }

    if let Some(ref id) = message.tool_call_id {
        total += estimate_tokens(id);
    }

    total
}

/// Estimate the token count for a whole message list.
pub fn estimate_conversation_tokens(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| u64::from(estimate_message_tokens(m)))
        .sum()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::ToolCallResponse;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_short() {
        // "Hello" = 5 chars / 3.2 = 1.5625 -> ceil = 2
        assert_eq!(estimate_tokens("Hello"), 2);
    }

    #[test]
    fn test_estimate_json_tokens() {
        // 8 chars / 2.8 = 2.86 -> ceil = 3
        assert_eq!(estimate_json_tokens("{\"a\": 1}"), 3);
    }

    #[test]
    fn test_estimate_message_tokens_content_only() {
        let msg = ChatMessage::user("Hello");
        assert_eq!(estimate_message_tokens(&msg), MESSAGE_OVERHEAD_TOKENS + 2);
    }

    #[test]
    fn test_estimate_message_tokens_with_tool_calls() {
        let msg = ChatMessage::assistant(
            None,
            Some(vec![ToolCallResponse::function("c1", "read_file", "{}")]),
        );
        let tokens = estimate_message_tokens(&msg);
        assert!(tokens > MESSAGE_OVERHEAD_TOKENS + TOOL_CALL_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_estimate_conversation_tokens_sums() {
        let messages = vec![ChatMessage::system("abc"), ChatMessage::user("Hello")];
        let expected = u64::from(estimate_message_tokens(&messages[0]))
            + u64::from(estimate_message_tokens(&messages[1]));
        assert_eq!(estimate_conversation_tokens(&messages), expected);
    }

    #[test]
    fn test_truncate_utf8_ascii() {
        assert_eq!(truncate_utf8("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_utf8_within_multibyte() {
        // "é" is 2 bytes; cutting at 2 lands inside it
        let s = "aé";
        assert_eq!(truncate_utf8(s, 2), "a");
    }

    #[test]
    fn test_truncate_tool_result_under_limit() {
        assert_eq!(truncate_tool_result("short", 100), "short");
        assert_eq!(truncate_tool_result("anything", 0), "anything");
    }

    #[test]
    fn test_truncate_tool_result_adds_notice() {
        let long = "x".repeat(50);
        let out = truncate_tool_result(&long, 10);
        assert!(out.starts_with("xxxxxxxxxx\n\n"));
        assert!(out.contains("showing 10 of 50 bytes"));
    }

    #[test]
    fn test_truncate_tool_result_unicode_no_panic() {
        let s = "日本語のテキスト";
        let out = truncate_tool_result(s, 4);
        assert!(out.starts_with("日"));
    }
}
