//! Loop configuration loading and validation.
//!
//! Reads `.agent-engine/config.yaml` and resolves environment variables.
//! Every field except `model` has a default, so a minimal file is one line.
//!
//! ```yaml
//! model: ${AGENT_MODEL:-qwen2.5-coder}
//! context_window: 32768
//! max_iterations: 50
//! permissions: "rw"
//! tool_timeout_secs: 120
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::AgentError;
use super::permissions::PermissionSet;

/// Env var pointing directly at a config file.
pub const CONFIG_ENV_VAR: &str = "AGENT_ENGINE_CONFIG";

/// Config path relative to a project directory.
const CONFIG_RELATIVE_PATH: &str = ".agent-engine/config.yaml";

// ─── LoopConfig ──────────────────────────────────────────────────────────────

/// Per-run settings for the agent loop. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// LLM calls allowed before the checkpoint handler runs.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Tiers that run without confirmation.
    #[serde(default, alias = "permissions")]
    pub granted_permissions: PermissionSet,
    /// When `false`, no tool schemas are sent to the model.
    #[serde(default = "default_tools_enabled")]
    pub tools_enabled: bool,
    /// Cap on each tool result fed back to the model (`0` = unlimited).
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
    /// Per-call tool timeout. No timeout when absent.
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

fn default_context_window() -> u32 {
    32_768
}

fn default_max_iterations() -> u32 {
    50
}

fn default_tools_enabled() -> bool {
    true
}

fn default_max_tool_result_chars() -> usize {
    6_000
}

impl LoopConfig {
    /// Defaults for everything but the model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            context_window: default_context_window(),
            max_iterations: default_max_iterations(),
            granted_permissions: PermissionSet::default(),
            tools_enabled: default_tools_enabled(),
            max_tool_result_chars: default_max_tool_result_chars(),
            tool_timeout_secs: None,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Reject configs the loop can't run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.model.trim().is_empty() {
            return Err(AgentError::ConfigError {
                reason: "model must not be empty".into(),
            });
        }
        if self.context_window == 0 {
            return Err(AgentError::ConfigError {
                reason: "context_window must be greater than 0".into(),
            });
        }
        if self.tool_timeout_secs == Some(0) {
            return Err(AgentError::ConfigError {
                reason: "tool_timeout_secs must be greater than 0 when set".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `AGENT_ENGINE_CONFIG` first, then searches upward from `start` for
/// `.agent-engine/config.yaml`, then the platform data directory.
pub fn find_config_path(start: &Path) -> Result<PathBuf, AgentError> {
    find_config_path_with(start, std::env::var_os(CONFIG_ENV_VAR))
}

fn find_config_path_with(start: &Path, env_override: Option<OsString>) -> Result<PathBuf, AgentError> {
    // 1. Explicit override
    if let Some(path) = env_override.map(PathBuf::from) {
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{CONFIG_ENV_VAR} points to a missing file");
    }

    // 2. Walk upward from `start`
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    // 3. Platform data dir
    let candidate = crate::data_dir().join("config.yaml");
    if candidate.is_file() {
        return Ok(candidate);
    }

    Err(AgentError::ConfigError {
        reason: format!("could not find {CONFIG_RELATIVE_PATH}"),
    })
}

/// Load, interpolate and validate a loop config file.
///
/// String values may use `${VAR_NAME}` or `${VAR_NAME:-default}`.
pub fn load_loop_config(path: &Path) -> Result<LoopConfig, AgentError> {
    let raw = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_loop_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        model = %config.model,
        max_iterations = config.max_iterations,
        permissions = %config.granted_permissions,
        "loaded loop config"
    );
    Ok(config)
}

/// Parse config text (after env interpolation) and validate it.
pub fn parse_loop_config(raw: &str) -> Result<LoopConfig, AgentError> {
    let interpolated = interpolate_env_vars(raw);
    let config: LoopConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
