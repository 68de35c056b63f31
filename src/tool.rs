//! Capability bindings.
//!
//! Tools implement the `Tool` trait and are collected into a `ToolSet` at
//! agent construction time. A tool is either an external capability (search,
//! formula evaluation) or a delegated agent wrapped by `AgentTool`.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::events::RunTrace;
use crate::message::Thread;

/// Tool definition for the model (matches OpenAI format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Result of a tool execution. Errors are carried as model-visible text,
/// never as run failures.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Context passed to tools during execution. Tools never reach back into
/// the invoking agent; everything they may see travels in here.
#[derive(Clone)]
pub struct ToolContext {
    /// Snapshot of the invoking run's thread. Taken before the pending
    /// tool-call round, so it only ever contains complete rounds.
    pub thread: Thread,
    /// Trace of the whole request, shared across the delegation tree.
    pub trace: Arc<RunTrace>,
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(thread: Thread, trace: Arc<RunTrace>, cancellation: CancellationToken) -> Self {
        Self {
            thread,
            trace,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used for dispatch)
    fn name(&self) -> &str;

    /// Get the tool definition for the model
    fn definition(&self) -> ToolDefinition;

    /// Per-run cap on invocations of this tool. `None` means uncapped.
    fn call_limit(&self) -> Option<u32> {
        None
    }

    /// Execute the tool with given arguments
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Summarize args into a short string for logging
pub(crate) fn summarize_args(args: &Value) -> String {
    match args {
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .take(2) // max 2 args shown
                .map(|(k, v)| {
                    let val = match v {
                        Value::String(s) => truncate(s, 30),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => "...".to_string(),
                    };
                    format!("{}={}", k, val)
                })
                .collect();
            parts.join(", ")
        }
        _ => "...".to_string(),
    }
}

/// Truncate a string with ellipsis
pub(crate) fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    // the cut must land on a char boundary or the slice panics
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

/// Ordered set of tools with pairwise-unique names.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Register a tool. A duplicate name is a construction-time error.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::Configuration(format!(
                "duplicate tool name '{}'",
                name
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Get all tool definitions (for the model)
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Convert to OpenAI ChatCompletionTool format
    pub fn to_openai_tools(&self) -> Vec<async_openai::types::ChatCompletionTool> {
        self.tools
            .values()
            .map(|t| {
                let def = t.definition();
                async_openai::types::ChatCompletionTool {
                    r#type: async_openai::types::ChatCompletionToolType::Function,
                    function: async_openai::types::FunctionObject {
                        name: def.name,
                        description: Some(def.description),
                        parameters: Some(def.parameters),
                        strict: None,
                    },
                }
            })
            .collect()
    }
}
