//! Inference — the model-facing side of the engine.
//!
//! This module owns everything that touches model input or output:
//! - Chat message, tool definition and response types
//! - The `LlmProvider` seam implemented by concrete transports
//! - Tool call parsing (native JSON, tag-based, JSON array in text)
//! - Response content processing (reasoning, display stripping)
//!
//! No transport lives here. Providers are supplied by the front end, which
//! makes the model interchangeable without touching the loop.

pub mod content;
pub mod errors;
pub mod provider;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use content::{extract_reasoning, process, strip_for_display, ProcessedContent};
pub use errors::InferenceError;
pub use provider::LlmProvider;
pub use tool_call_parser::{
    parse_json_array_calls, parse_native_json_tool_call, parse_tag_based_calls,
};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Role, ToolCall, ToolCallResponse, ToolDefinition,
    Usage,
};
