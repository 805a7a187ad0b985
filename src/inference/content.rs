//! Response content processing — reasoning, display text, and text-encoded
//! tool calls.
//!
//! Everything here is pure string analysis over a single model response.
//! Structured (native) tool calls never pass through this module; see
//! [`super::tool_call_parser::parse_native_json_tool_call`].

use std::sync::OnceLock;

use regex::Regex;

use super::tool_call_parser::{find_json_array_span, parse_json_array_calls, parse_tag_based_calls};
use super::types::ToolCall;

/// Tag names the display stripper treats as markup.
const KNOWN_TAGS: &[&str] = &[
    "think",
    "thinking",
    "invoke",
    "parameter",
    "function_calls",
    "tool_call",
    "minimax:tool_call",
    "|tool_call_start|",
    "|tool_call_end|",
];

/// A single model response split into its parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedContent {
    /// Reasoning segments, in order of appearance.
    pub reasoning: Vec<String>,
    /// User-facing text with all markup removed. May be empty.
    pub display: String,
    /// Tool calls recovered from the text (tag-based, then JSON array).
    pub tool_calls: Vec<ToolCall>,
}

/// Split raw response text into reasoning, display text and text tool calls.
pub fn process(text: &str) -> ProcessedContent {
    ProcessedContent {
        reasoning: extract_reasoning(text),
        display: strip_for_display(text),
        tool_calls: parse_text_tool_calls(text),
    }
}

/// Tool calls encoded in text: tag-based forms win over a JSON array.
///
/// Reasoning segments are removed first; calls the model only thought about
/// are never returned.
pub fn parse_text_tool_calls(text: &str) -> Vec<ToolCall> {
    let visible = reasoning_block_regex().replace_all(text, "");
    let tagged = parse_tag_based_calls(&visible);
    if !tagged.is_empty() {
        return tagged;
    }
    parse_json_array_calls(&visible)
}

// ─── Reasoning ───────────────────────────────────────────────────────────────

/// A whole reasoning block; an unclosed one runs to the end of the text.
fn reasoning_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<think(?:ing)?>.*?(?:</think(?:ing)?>|\z)").expect("reasoning block regex is valid")
    })
}

fn reasoning_open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(think|thinking)>").expect("reasoning regex is valid"))
}

/// Collect `<think>` / `<thinking>` segments in order.
///
/// An opening tag with no matching close (truncated output) yields the rest
/// of the text as a final segment. Segments are trimmed; blank ones are
/// dropped.
pub fn extract_reasoning(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(caps) = reasoning_open_regex().captures(&text[pos..]) {
        let (Some(open), Some(tag)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let body_start = pos + open.end();
        let close = format!("</{}>", tag.as_str());

        let (body, next) = match text[body_start..].find(&close) {
            Some(offset) => (
                &text[body_start..body_start + offset],
                body_start + offset + close.len(),
            ),
            None => (&text[body_start..], text.len()),
        };

        let trimmed = body.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
        pos = next;
    }

    segments
}

// ─── Display Stripping ───────────────────────────────────────────────────────

fn block_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?s)<invoke\b[^>]*>.*?(?:</invoke>|\z)",
            r"(?s)<tool_call>.*?(?:</tool_call>|\z)",
            r"(?s)<\|tool_call_start\|>.*?(?:<\|tool_call_end\|>|\z)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("block regex is valid"))
        .collect()
    })
}

fn orphan_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"</?(?:thinking|think|invoke|parameter|function_calls|minimax:tool_call|tool_call)\b[^>]*>|<\|tool_call_(?:start|end)\|>",
        )
        .expect("orphan tag regex is valid")
    })
}

fn empty_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[a-zA-Z]*\s*```").expect("fence regex is valid"))
}

fn blank_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank run regex is valid"))
}

/// Remove reasoning, tool-call markup and orphaned tags, leaving only what a
/// user should see.
///
/// Idempotent: `strip_for_display(strip_for_display(x)) == strip_for_display(x)`.
pub fn strip_for_display(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        // Every pass only removes text, so this terminates.
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let mut out = reasoning_block_regex().replace_all(text, "").into_owned();

    for re in block_regexes() {
        out = re.replace_all(&out, "").into_owned();
    }

    if !parse_json_array_calls(&out).is_empty() {
        if let Some((start, end)) = find_json_array_span(&out) {
            out.replace_range(start..end, "");
        }
    }

    out = orphan_tag_regex().replace_all(&out, "").into_owned();
    out = empty_fence_regex().replace_all(&out, "").into_owned();
    strip_trailing_partial_tag(&mut out);
    out = blank_run_regex().replace_all(&out, "\n\n").into_owned();

    out.trim().to_string()
}

/// Drop a half-written known tag at the very end, e.g. `"Done.</thi"`.
fn strip_trailing_partial_tag(text: &mut String) {
    let Some(lt) = text.rfind('<') else {
        return;
    };
    let fragment = &text[lt + 1..];
    if fragment.contains('>') {
        return;
    }

    let fragment = fragment.trim_start_matches('/');
    let (head, has_attrs) = match fragment.find(char::is_whitespace) {
        Some(ws) => (&fragment[..ws], true),
        None => (fragment, false),
    };
    if head.is_empty() {
        return;
    }

    let partial = if has_attrs {
        KNOWN_TAGS.contains(&head)
    } else {
        KNOWN_TAGS.iter().any(|tag| tag.starts_with(head))
    };
    if partial {
        text.truncate(lt);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_reasoning_in_order() {
        let text = "<think>first</think>Answer part.<thinking>\n second \n</thinking>";
        assert_eq!(extract_reasoning(text), vec!["first", "second"]);
    }

    #[test]
    fn test_extract_reasoning_unclosed_runs_to_end() {
        let text = "Hello <think>still pondering the question";
        assert_eq!(extract_reasoning(text), vec!["still pondering the question"]);
    }

    #[test]
    fn test_extract_reasoning_skips_blank_segments() {
        let text = "<think>   </think>text<think>\n\n</think>";
        assert!(extract_reasoning(text).is_empty());
    }

    #[test]
    fn test_extract_reasoning_none() {
        assert!(extract_reasoning("plain answer").is_empty());
    }

    #[test]
    fn test_strip_removes_reasoning() {
        let text = "<think>secret plan</think>\nThe answer is 4.";
        let display = strip_for_display(text);
        assert_eq!(display, "The answer is 4.");
        assert!(!display.contains("secret plan"));
    }

    #[test]
    fn test_strip_removes_invoke_blocks_and_wrapper() {
        let text = r#"Reading the file now.
<function_calls>
<invoke name="read_file"><parameter name="file_path">a.py</parameter></invoke>
</function_calls>"#;
        assert_eq!(strip_for_display(text), "Reading the file now.");
    }

    #[test]
    fn test_strip_removes_json_tool_array_in_fence() {
        let text = "Running it.\n```json\n[{\"id\": \"c1\", \"type\": \"function\", \"function\": {\"name\": \"list_dir\", \"arguments\": \"{}\"}}]\n```";
        assert_eq!(strip_for_display(text), "Running it.");
    }

    #[test]
    fn test_strip_keeps_plain_json_data() {
        let text = r#"People: [{"name": "Ada"}]"#;
        assert_eq!(strip_for_display(text), text);
    }

    #[test]
    fn test_strip_removes_orphan_and_partial_tags() {
        assert_eq!(strip_for_display("Done.</think>"), "Done.");
        assert_eq!(strip_for_display("Done.\n</parameter>\n</invoke>"), "Done.");
        assert_eq!(strip_for_display("Done.</thi"), "Done.");
        assert_eq!(strip_for_display("Done. <invoke name=\"x"), "Done.");
    }

    #[test]
    fn test_strip_keeps_unrelated_angle_brackets() {
        assert_eq!(strip_for_display("if a < b then"), "if a < b then");
        assert_eq!(strip_for_display("Use <b>bold</b>"), "Use <b>bold</b>");
    }

    #[test]
    fn test_strip_collapses_blank_runs() {
        let text = "one\n\n\n\ntwo<think>x</think>\n\n\n\nthree";
        assert_eq!(strip_for_display(text), "one\n\ntwo\n\nthree");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let inputs = [
            "<think>a</think>\n\n\n<tool_call>{\"name\": \"x\"}</tool_call>\n\n\nText",
            "<thi<think>nested</think>nk>odd</think>",
            "Intro\n<invoke name=\"a\"><parameter name=\"p\">1",
            "```json\n[{\"function\": {\"name\": \"a\", \"arguments\": {}}}]\n```\n\n\nafter",
            "  <|tool_call_start|>[x()]<|tool_call_end|>  tail </tool_",
            "",
        ];
        for input in inputs {
            let once = strip_for_display(input);
            assert_eq!(strip_for_display(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_process_splits_all_parts() {
        let text = r#"<think>need the file</think>Let me read it.
<invoke name="read_file"><parameter name="file_path">a.py</parameter></invoke>"#;
        let processed = process(text);
        assert_eq!(processed.reasoning, vec!["need the file"]);
        assert_eq!(processed.display, "Let me read it.");
        assert_eq!(processed.tool_calls.len(), 1);
        assert_eq!(processed.tool_calls[0].name, "read_file");
    }

    #[test]
    fn test_calls_inside_reasoning_are_ignored() {
        let tagged = "<think>Maybe I should run <tool_call>{\"name\": \"run_command\", \"arguments\": {\"command\": \"rm -rf build\"}}</tool_call> but no.</think>The build dir is fine.";
        let processed = process(tagged);
        assert!(processed.tool_calls.is_empty());
        assert_eq!(processed.display, "The build dir is fine.");

        let array = r#"<think>plan: [{"function": {"name": "write_file", "arguments": {}}}]</think>Final answer."#;
        assert!(process(array).tool_calls.is_empty());

        let unclosed = r#"Checking.<think>[{"function": {"name": "write_file", "arguments": {}}}]"#;
        assert!(parse_text_tool_calls(unclosed).is_empty());
    }

    #[test]
    fn test_call_after_reasoning_still_parsed() {
        let text = r#"<think>I need the file</think><tool_call>{"name": "read_file", "arguments": {"file_path": "a.py"}}</tool_call>"#;
        let calls = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
    }

    #[test]
    fn test_text_calls_prefer_tags_over_json() {
        let text = r#"<tool_call>{"name": "a", "arguments": {}}</tool_call>
[{"function": {"name": "b", "arguments": {}}}]"#;
        let calls = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "a");
    }
}
