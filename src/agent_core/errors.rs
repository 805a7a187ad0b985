//! Agent Core error types.

use thiserror::Error;

/// Errors that can occur during agent core operations.
///
/// None of these escape `AgentLoop::run`; the loop turns them into result
/// messages or notices. They surface from configuration loading, logging
/// setup and collaborator implementations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Loop configuration could not be found, read or parsed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// Tool execution error (worker crash, timeout).
    #[error("tool execution failed: {reason}")]
    ToolExecutionError { reason: String },

    /// Confirmation channel error.
    #[error("confirmation channel error: {reason}")]
    ConfirmationError { reason: String },

    /// Summarizing, saving or restoring a checkpoint failed.
    #[error("checkpoint error: {reason}")]
    CheckpointError { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    /// Log directory or subscriber setup failed.
    #[error("logging setup failed: {reason}")]
    LoggingError { reason: String },
}

/// Errors returned by a `ToolRegistry` implementation.
///
/// The router renders these into `Error: ...` result text for the model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// The tool ran and reported a failure.
    #[error("{reason}")]
    Failed { reason: String },

    /// No tool with this name is registered.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Arguments don't satisfy the tool's schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    pub fn failed(reason: impl Into<String>) -> Self {
        ToolError::Failed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(e: serde_yaml::Error) -> Self {
        AgentError::ConfigError {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_converts_to_serialization_error() {
        let err: AgentError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AgentError::SerializationError { .. }));
    }

    #[test]
    fn test_tool_error_display() {
        assert_eq!(ToolError::failed("disk full").to_string(), "disk full");
        assert_eq!(
            ToolError::UnknownTool {
                name: "nope".into()
            }
            .to_string(),
            "unknown tool: 'nope'"
        );
    }

    #[test]
    fn test_yaml_error_converts_to_config_error() {
        let err: AgentError = serde_yaml::from_str::<serde_yaml::Value>("a: [")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("config error:"));
    }
}
