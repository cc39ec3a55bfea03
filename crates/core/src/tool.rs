//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the agent act on the user's data: create things, save
//! memories, schedule check-ins. The agent loop never sees individual tools;
//! it talks to a [`ToolDispatcher`], which turns every outcome (including
//! failures) into a serialized payload the model can read.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "create_thing").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments, returning a JSON payload.
    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Executes tools by name on behalf of the agent loop.
///
/// `execute` never fails: errors come back as `{"error": "..."}` payloads so the
/// model can see them and react.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// The catalog advertised to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run a tool and return its serialized result.
    async fn execute(&self, name: &str, params: &Value) -> String;
}

/// Serialize an error message the way every tool failure reaches the model.
pub fn error_payload(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool, surfacing its typed error.
    pub async fn call(&self, name: &str, arguments: Value) -> std::result::Result<Value, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    /// Definitions sorted by name so the catalog (and its token cost) is stable.
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    async fn execute(&self, name: &str, params: &Value) -> String {
        match self.call(name, params.clone()).await {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "Tool returned an error");
                error_payload(e)
            }
        }
    }
}
