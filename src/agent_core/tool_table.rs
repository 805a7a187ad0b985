//! Tool table — static metadata for every tool the agent may call.
//!
//! Provides:
//! - Tier lookup for the permission check (unknown tools read as `r`)
//! - Terminal-tool lookup (a successful terminal call ends the run)
//! - Structural validation of arguments against the declared schema
//!
//! The table is built explicitly with [`ToolTable::builder`]. Execution lives
//! behind the [`ToolRegistry`] trait, implemented by the front end.

use std::collections::BTreeMap;

use super::errors::ToolError;
use super::permissions::{needs_confirmation, PermissionSet, Tier};
use crate::inference::types::ToolDefinition;

// ─── Registry Trait ──────────────────────────────────────────────────────────

/// Executes tools by name.
///
/// `execute` may block (file I/O, subprocesses); the router always calls it
/// from a blocking worker thread.
pub trait ToolRegistry: Send + Sync + 'static {
    /// Tool schemas advertised to the model.
    fn schemas(&self) -> Vec<ToolDefinition>;

    /// Run a tool and return its textual result.
    fn execute(&self, name: &str, arguments: &serde_json::Value) -> Result<String, ToolError>;
}

// ─── Descriptors ─────────────────────────────────────────────────────────────

/// Metadata for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub tier: Tier,
    /// A successful call ends the run after the current tool round.
    pub terminal: bool,
    /// JSON Schema for the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tier,
            terminal: false,
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// OpenAI function-calling definition for this tool.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: crate::inference::types::FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

// ─── ToolTable ───────────────────────────────────────────────────────────────

/// Lookup table from tool name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct ToolTable {
    tools: BTreeMap<String, ToolDescriptor>,
}

/// Builder for [`ToolTable`]. Registering a name twice keeps the last one.
#[derive(Debug, Default)]
pub struct ToolTableBuilder {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolTableBuilder {
    pub fn register(mut self, descriptor: ToolDescriptor) -> Self {
        if self.tools.contains_key(&descriptor.name) {
            tracing::warn!(tool = %descriptor.name, "tool registered twice, keeping the last");
        }
        self.tools.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn build(self) -> ToolTable {
        tracing::debug!(count = self.tools.len(), "tool table built");
        ToolTable { tools: self.tools }
    }
}

impl ToolTable {
    pub fn builder() -> ToolTableBuilder {
        ToolTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Permission tier, `r` for unknown tools.
    pub fn tier(&self, name: &str) -> Tier {
        self.get(name).map(|d| d.tier).unwrap_or(Tier::Read)
    }

    /// Whether the tool ends the run, `false` for unknown tools.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.get(name).map(|d| d.terminal).unwrap_or(false)
    }

    /// Whether a call to `name` must be confirmed under `granted`.
    pub fn needs_confirmation(&self, name: &str, granted: &PermissionSet) -> bool {
        needs_confirmation(self.tier(name), granted)
    }

    /// All tool definitions in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(ToolDescriptor::to_definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate arguments: must be an object with every `required` field.
    ///
    /// This is a basic structural check. Full JSON Schema validation is left
    /// to the tool itself. Tools missing from the table pass unchecked.
    pub fn validate_arguments(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), ToolError> {
        let Some(def) = self.get(name) else {
            return Ok(());
        };

        let Some(args_obj) = arguments.as_object() else {
            return Err(ToolError::InvalidArguments {
                tool: name.to_string(),
                reason: "arguments must be a JSON object".into(),
            });
        };

        let required = def
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|f| f.as_str()).collect::<Vec<_>>())
            .unwrap_or_default();

        for field_name in required {
            if !args_obj.contains_key(field_name) {
                return Err(ToolError::InvalidArguments {
                    tool: name.to_string(),
                    reason: format!("missing required field: '{field_name}'"),
                });
            }
        }

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
