//! Tool call parsing — normalizes model output to `ToolCall` structs.
//!
//! Three encodings reach the agent loop:
//!
//! 1. **Native** — structured `tool_calls` supplied by the provider. The
//!    function name and JSON-encoded arguments arrive as separate fields.
//!
//! 2. **Tag-based** — calls embedded in the text content with markup:
//!    ```text
//!    <invoke name="read_file"><parameter name="file_path">a.py</parameter></invoke>
//!    <tool_call>{"name": "read_file", "arguments": {"file_path": "a.py"}}</tool_call>
//!    <|tool_call_start|>[read_file(file_path="a.py")]<|tool_call_end|>
//!    ```
//!    These are pattern-matched, never validated as markup.
//!
//! 3. **JSON array** — the structured convention written out as literal text:
//!    ```text
//!    [{"id": "call_1", "type": "function",
//!      "function": {"name": "read_file", "arguments": "{\"file_path\": \"a.py\"}"}}]
//!    ```
//!    Strict parsing first, then a regex heuristic for broken JSON.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::ToolCall;

fn generated_call_id() -> String {
    format!("call_{}", Uuid::new_v4())
}

fn empty_arguments() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// ─── Native JSON Parsing ─────────────────────────────────────────────────────

/// Parse a structured tool call supplied by the provider.
///
/// An empty argument string means "no arguments". Malformed JSON is run
/// through [`repair_malformed_tool_call_json`] before giving up.
pub fn parse_native_json_tool_call(
    id: Option<&str>,
    name: &str,
    arguments_json: &str,
) -> Result<ToolCall, InferenceError> {
    let call_id = id
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(generated_call_id);

    if name.trim().is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: "empty tool name".into(),
        });
    }

    let raw = arguments_json.trim();
    let arguments = if raw.is_empty() {
        empty_arguments()
    } else {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v) => v,
            Err(e) => match repair_malformed_tool_call_json(raw) {
                Some(v) => {
                    tracing::debug!(tool = %name, "repaired malformed tool call arguments");
                    v
                }
                None => {
                    return Err(InferenceError::ToolCallParseError {
                        raw_response: arguments_json.to_string(),
                        reason: format!("invalid JSON arguments: {e}"),
                    })
                }
            },
        }
    };

    // Some models double-encode: the arguments field holds a JSON string
    // whose content is the real object.
    let arguments = match arguments {
        serde_json::Value::String(inner) => serde_json::from_str(&inner).map_err(|e| {
            InferenceError::ToolCallParseError {
                raw_response: arguments_json.to_string(),
                reason: format!("invalid JSON arguments: {e}"),
            }
        })?,
        serde_json::Value::Null => empty_arguments(),
        other => other,
    };

    if !arguments.is_object() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: "arguments must be a JSON object".into(),
        });
    }

    Ok(ToolCall {
        id: call_id,
        name: name.trim().to_string(),
        arguments,
    })
}

// ─── Tag-Based Parsing ───────────────────────────────────────────────────────

/// Extract tool calls embedded in text with tag markup.
///
/// Supports multiple forms (tried in order, first form with results wins):
///
/// 1. `<invoke name="…"><parameter name="…">…</parameter></invoke>`
/// 2. `<tool_call>{"name": …, "arguments": …}</tool_call>`
/// 3. `<|tool_call_start|>[tool(key="value")]<|tool_call_end|>`
///
/// Tolerates interleaved prose and unclosed tags.
pub fn parse_tag_based_calls(text: &str) -> Vec<ToolCall> {
    let calls = parse_invoke_blocks(text);
    if !calls.is_empty() {
        return calls;
    }

    let calls = parse_tool_call_blocks(text);
    if !calls.is_empty() {
        return calls;
    }

    parse_special_token_blocks(text)
}

fn invoke_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<invoke\s+name\s*=\s*["']([^"'>]+)["']\s*/?>(.*?)(?:</invoke>|\z)"#)
            .expect("invoke regex is valid")
    })
}

fn parameter_open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<parameter\s+name\s*=\s*["']([^"'>]+)["']\s*>"#)
            .expect("parameter regex is valid")
    })
}

fn tool_call_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>(.*?)(?:</tool_call>|\z)").expect("tool_call regex is valid")
    })
}

/// Form 1: `<invoke name="tool">` blocks with `<parameter>` children.
fn parse_invoke_blocks(text: &str) -> Vec<ToolCall> {
    invoke_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            if name.is_empty() {
                return None;
            }
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            Some(ToolCall {
                id: generated_call_id(),
                name: name.to_string(),
                arguments: parse_invoke_parameters(body),
            })
        })
        .collect()
}

/// Collect `<parameter name="k">v</parameter>` pairs from an invoke body.
///
/// An unclosed parameter runs until the next `<parameter` or the end of the
/// body.
fn parse_invoke_parameters(body: &str) -> serde_json::Value {
    let opens: Vec<(usize, usize, String)> = parameter_open_regex()
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().trim().to_string();
            Some((whole.start(), whole.end(), key))
        })
        .collect();

    let mut map = serde_json::Map::new();
    for (idx, (_, value_start, key)) in opens.iter().enumerate() {
        let limit = opens
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(body.len());
        let segment = &body[*value_start..limit];
        let raw = match segment.find("</parameter>") {
            Some(end) => &segment[..end],
            None => segment,
        };
        if !key.is_empty() {
            map.insert(key.clone(), decode_parameter_value(raw));
        }
    }
    serde_json::Value::Object(map)
}

/// Decode a tag parameter: JSON literals are decoded, anything else stays text.
fn decode_parameter_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => v,
        Err(_) => serde_json::Value::String(trimmed.to_string()),
    }
}

/// Form 2: `<tool_call>{json}</tool_call>` blocks.
fn parse_tool_call_blocks(text: &str) -> Vec<ToolCall> {
    tool_call_block_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let body = caps.get(1)?.as_str().trim();
            let value = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .or_else(|| repair_malformed_tool_call_json(body))?;
            let name = value.get("name").and_then(|v| v.as_str())?.trim();
            if name.is_empty() {
                return None;
            }
            let arguments = value
                .get("arguments")
                .or_else(|| value.get("parameters"))
                .map(coerce_arguments)
                .unwrap_or_else(empty_arguments);
            Some(ToolCall {
                id: generated_call_id(),
                name: name.to_string(),
                arguments,
            })
        })
        .collect()
}

/// Form 3: `<|tool_call_start|>…<|tool_call_end|>` blocks.
fn parse_special_token_blocks(text: &str) -> Vec<ToolCall> {
    const START_TAG: &str = "<|tool_call_start|>";
    const END_TAG: &str = "<|tool_call_end|>";

    let mut calls = Vec::new();
    let mut search_from = 0;

    while let Some(start_offset) = text[search_from..].find(START_TAG) {
        let abs_start = search_from + start_offset + START_TAG.len();
        let (block, next) = match text[abs_start..].find(END_TAG) {
            Some(end_offset) => (
                &text[abs_start..abs_start + end_offset],
                abs_start + end_offset + END_TAG.len(),
            ),
            None => (&text[abs_start..], text.len()),
        };
        search_from = next;

        let block = block.trim();
        // Strip optional outer brackets
        let inner = if block.starts_with('[') && block.ends_with(']') {
            &block[1..block.len() - 1]
        } else {
            block
        };

        if let Some(call) = parse_bracket_expression(inner) {
            calls.push(call);
        }
    }

    calls
}

/// Parse a single bracket expression like `tool(key="value", key2=123)`.
fn parse_bracket_expression(expr: &str) -> Option<ToolCall> {
    let expr = expr.trim();
    let Some(paren_idx) = expr.find('(') else {
        // No parens — just a tool name
        if expr.is_empty() || expr.contains(char::is_whitespace) {
            return None;
        }
        return Some(ToolCall {
            id: generated_call_id(),
            name: expr.to_string(),
            arguments: empty_arguments(),
        });
    };

    let tool_name = expr[..paren_idx].trim();
    if tool_name.is_empty() {
        return None;
    }

    // Extract args between ( and final )
    let args_str = if expr.ends_with(')') {
        &expr[paren_idx + 1..expr.len() - 1]
    } else {
        &expr[paren_idx + 1..]
    };

    Some(ToolCall {
        id: generated_call_id(),
        name: tool_name.to_string(),
        arguments: parse_bracket_args(args_str),
    })
}

/// Parse Python-style kwargs like `key="value", key2=123` into a JSON object.
///
/// Handles: string values (single/double quoted), numeric values, booleans,
/// and raw JSON. Falls back to empty object if kwargs parsing finds nothing.
fn parse_bracket_args(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return empty_arguments();
    }

    // Some models emit a JSON object inside the parens
    if raw.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) {
            return v;
        }
    }

    let mut map = serde_json::Map::new();
    let mut remaining = raw;

    while !remaining.is_empty() {
        remaining = remaining.trim_start_matches([',', ' ']).trim();
        if remaining.is_empty() {
            break;
        }

        let Some(eq_idx) = remaining.find('=') else {
            break;
        };

        let key = remaining[..eq_idx].trim().trim_matches('"').trim_matches('\'');
        remaining = &remaining[eq_idx + 1..];

        let (value, rest) = parse_bracket_value(remaining);
        if !key.is_empty() {
            map.insert(key.to_string(), value);
        }
        remaining = rest;
    }

    serde_json::Value::Object(map)
}

/// Parse a single value from a kwargs expression. Returns `(value, remaining_str)`.
fn parse_bracket_value(input: &str) -> (serde_json::Value, &str) {
    let input = input.trim();

    // Quoted string (double or single)
    if let Some(quote) = input.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let mut escaped = false;
        for (offset, ch) in input[1..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            if ch == '\\' {
                escaped = true;
                continue;
            }
            if ch == quote {
                let end = 1 + offset;
                let val = &input[1..end];
                let rest = &input[end + 1..];
                return (serde_json::Value::String(val.to_string()), rest);
            }
        }
        // Unterminated string — take everything
        return (serde_json::Value::String(input[1..].to_string()), "");
    }

    let end_idx = input.find(',').unwrap_or(input.len());
    let val_str = input[..end_idx].trim().trim_end_matches(')');

    if let Ok(n) = val_str.parse::<i64>() {
        return (serde_json::Value::Number(n.into()), &input[end_idx..]);
    }
    if let Ok(n) = val_str.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return (serde_json::Value::Number(num), &input[end_idx..]);
        }
    }

    match val_str.to_lowercase().as_str() {
        "true" => return (serde_json::Value::Bool(true), &input[end_idx..]),
        "false" => return (serde_json::Value::Bool(false), &input[end_idx..]),
        "none" | "null" => return (serde_json::Value::Null, &input[end_idx..]),
        _ => {}
    }

    (serde_json::Value::String(val_str.to_string()), &input[end_idx..])
}

// ─── JSON Array Parsing ──────────────────────────────────────────────────────

/// Extract tool calls from a JSON array of `{id, type, function}` objects
/// written as plain text.
///
/// Strict JSON is tried first. When that fails, a regex heuristic recovers
/// what it can (see [`heuristic_array_calls`]). Never fails; unusable input
/// yields an empty vec.
pub fn parse_json_array_calls(text: &str) -> Vec<ToolCall> {
    let Some((start, end)) = find_json_array_span(text) else {
        return Vec::new();
    };
    let candidate = &text[start..end];

    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Array(items)) => strict_array_calls(&items),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::debug!(error = %e, "strict JSON tool call parse failed, trying heuristic");
            heuristic_array_calls(candidate)
        }
    }
}

/// Byte span of the first `[{`-shaped array in `text`.
///
/// The span ends at the matching `]`, or at end of text when the array was
/// truncated.
pub(crate) fn find_json_array_span(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'[' {
            continue;
        }
        let next = text[i + 1..].trim_start();
        if !next.starts_with('{') {
            continue;
        }
        let end = find_matching_bracket(text, i).map(|c| c + 1).unwrap_or(text.len());
        return Some((i, end));
    }
    None
}

fn strict_array_calls(items: &[serde_json::Value]) -> Vec<ToolCall> {
    items
        .iter()
        .filter_map(|item| {
            let (name, arguments) = match item.get("function") {
                Some(function) => (
                    function.get("name").and_then(|v| v.as_str())?,
                    function.get("arguments"),
                ),
                // Flat `{name, arguments}` elements are accepted only when the
                // arguments key is present, so ordinary JSON data isn't taken
                // for a call.
                None => (
                    item.get("name").and_then(|v| v.as_str())?,
                    Some(item.get("arguments")?),
                ),
            };
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let id = item
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .unwrap_or_else(generated_call_id);
            Some(ToolCall {
                id,
                name: name.to_string(),
                arguments: arguments.map(coerce_arguments).unwrap_or_else(empty_arguments),
            })
        })
        .collect()
}

/// Turn an `arguments` field into an object: strings get a nested JSON
/// parse, falling back to `{}`.
fn coerce_arguments(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(_) => value.clone(),
        serde_json::Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            _ => empty_arguments(),
        },
        _ => empty_arguments(),
    }
}

fn name_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\\?"name\\?"\s*:\s*\\?"([^"\\]+)\\?""#).expect("name regex is valid")
    })
}

fn arguments_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""arguments"\s*:\s*"#).expect("arguments regex is valid"))
}

fn string_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\\?"([A-Za-z_][A-Za-z0-9_\-]*)\\?"\s*:\s*\\?"((?:[^"\\]|\\[^"])*)\\?""#)
            .expect("pair regex is valid")
    })
}

fn scalar_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\\?"([A-Za-z_][A-Za-z0-9_\-]*)\\?"\s*:\s*(-?\d+(?:\.\d+)?|true|false|null)\b"#)
            .expect("scalar regex is valid")
    })
}

/// Best-effort recovery from JSON that failed strict parsing.
///
/// Heuristic, not a parser: finds each `"name": "…"`, then rebuilds the
/// arguments from `"key": "value"` (and bare scalar) pairs located after the
/// adjacent `"arguments":` marker and before the next name. It can
/// mis-extract on adversarial input; it never panics or errors.
fn heuristic_array_calls(text: &str) -> Vec<ToolCall> {
    let names: Vec<(usize, usize, String)> = name_field_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().trim().to_string();
            (!name.is_empty()).then_some((whole.start(), whole.end(), name))
        })
        .collect();

    let mut calls = Vec::with_capacity(names.len());
    for (idx, (_, name_end, name)) in names.iter().enumerate() {
        let region_end = names
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(text.len());
        let region = &text[*name_end..region_end];

        let mut map = serde_json::Map::new();
        if let Some(marker) = arguments_marker_regex().find(region) {
            let args_region = &region[marker.end()..];
            for caps in scalar_pair_regex().captures_iter(args_region) {
                if let (Some(k), Some(v)) = (caps.get(1), caps.get(2)) {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(v.as_str()) {
                        map.insert(k.as_str().to_string(), value);
                    }
                }
            }
            for caps in string_pair_regex().captures_iter(args_region) {
                if let (Some(k), Some(v)) = (caps.get(1), caps.get(2)) {
                    map.insert(k.as_str().to_string(), unescape_fragment(v.as_str()));
                }
            }
        }

        calls.push(ToolCall {
            id: generated_call_id(),
            name: name.clone(),
            arguments: serde_json::Value::Object(map),
        });
    }
    calls
}

/// Decode JSON escapes in a recovered string fragment where possible.
fn unescape_fragment(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<String>(&format!("\"{raw}\"")) {
        Ok(s) => serde_json::Value::String(s),
        Err(_) => serde_json::Value::String(raw.to_string()),
    }
}

/// Find the matching `]` for a `[` at position `start`.
///
/// Brackets inside quoted strings are ignored to handle cases like
/// `[{"arguments": "[x]"}]` where the inner `[` is part of a string value.
pub(crate) fn find_matching_bracket(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut string_char = 0u8;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];

        if !in_string && (b == b'"' || b == b'\'') {
            in_string = true;
            string_char = b;
            i += 1;
            continue;
        }
        if in_string {
            if b == string_char && (i == 0 || bytes[i - 1] != b'\\') {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

// ─── Malformed JSON Repair ──────────────────────────────────────────────────

/// Attempt to repair malformed JSON arguments from a model tool call.
///
/// Common malformations:
/// 1. Double quotes: `"key":""value"` (extra quote before value)
/// 2. Trailing commas: `{"a":1,}`
/// 3. Missing closing brace (unbalanced)
/// 4. Unescaped control characters in string values
///
/// Returns `Some(value)` if repair succeeds, `None` if irreparable.
pub fn repair_malformed_tool_call_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) {
        return Some(v);
    }

    let mut repaired = repair_double_quotes(raw);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    repaired = repair_trailing_commas(&repaired);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    repaired = repair_unbalanced_braces(&repaired);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&repaired) {
        return Some(v);
    }

    repaired = repair_control_characters(&repaired);
    serde_json::from_str::<serde_json::Value>(&repaired).ok()
}

/// Collapse `:""value` into `:"value` (an empty string `:""` followed by `,`
/// or `}` is left alone).
fn repair_double_quotes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if i + 3 < bytes.len()
            && bytes[i] == b':'
            && bytes[i + 1] == b'"'
            && bytes[i + 2] == b'"'
            && bytes[i + 3] != b','
            && bytes[i + 3] != b'}'
        {
            result.push(b':');
            result.push(b'"');
            i += 3;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(result).unwrap_or_else(|_| input.to_string())
}

/// Remove trailing commas before `}` or `]`.
fn repair_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut result = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}

/// Append closing braces to balance unmatched opening braces.
fn repair_unbalanced_braces(input: &str) -> String {
    let mut brace_depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if !in_string {
            if ch == '{' {
                brace_depth += 1;
            } else if ch == '}' {
                brace_depth -= 1;
            }
        }
    }

    let mut result = input.to_string();
    for _ in 0..brace_depth.max(0) {
        result.push('}');
    }
    result
}

/// Remove non-printable control characters that break JSON parsing.
/// Preserves `\n`, `\r`, `\t`.
fn repair_control_characters(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !c.is_control() || c == '\n' || c == '\r' || c == '\t')
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
