//! Conversation — the ordered message history of one agent run.
//!
//! The agent loop owns the conversation exclusively. Collaborators only see
//! it through the loop: providers get a `&[ChatMessage]`, checkpoint stores
//! get `&mut Vec<ChatMessage>` during restore.

use crate::inference::types::{ChatMessage, Role, ToolCallResponse};

use super::tokens;

/// In-memory conversation history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt)],
        }
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    /// Append an assistant message exactly as the model returned it.
    pub fn push_assistant(&mut self, content: Option<String>, tool_calls: Option<Vec<ToolCallResponse>>) {
        self.push(ChatMessage::assistant(content, tool_calls));
    }

    pub fn push_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.push(ChatMessage::tool_result(tool_call_id, name, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Mutable access for checkpoint restore.
    pub fn messages_mut(&mut self) -> &mut Vec<ChatMessage> {
        &mut self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The first message, if it is a system prompt.
    pub fn system_prompt(&self) -> Option<&ChatMessage> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// Heuristic token count of the whole history.
    pub fn estimated_tokens(&self) -> u64 {
        tokens::estimate_conversation_tokens(&self.messages)
    }
}

/// Drop every message except a leading system prompt, then append `message`.
pub fn reset_keeping_system(messages: &mut Vec<ChatMessage>, message: ChatMessage) {
    let keep = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
    messages.truncate(keep);
    messages.push(message);
}
