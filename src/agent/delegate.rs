//! Delegation edges.
//!
//! `AgentTool` wraps a child agent so a parent's model can call it like any
//! other tool. The edge carries the policy: an optional per-run call cap
//! (enforced by the parent's ledger, not here) and whether the child sees
//! the parent's thread or starts fresh.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::agent::base::{Agent, RunScope};
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutcome};

pub struct AgentTool {
    name: String,
    description: String,
    parameter: String,
    agent: Arc<Agent>,
    call_limit: Option<u32>,
    forward_thread: bool,
}

impl AgentTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter: impl Into<String>,
        agent: Arc<Agent>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter: parameter.into(),
            agent,
            call_limit: None,
            forward_thread: false,
        }
    }

    /// Cap how often the parent may take this edge in one run.
    pub fn with_call_limit(mut self, limit: u32) -> Self {
        self.call_limit = Some(limit);
        self
    }

    /// Hand the child the parent's thread instead of a fresh one.
    pub fn forwarding_thread(mut self) -> Self {
        self.forward_thread = true;
        self
    }
}

#[async_trait::async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> ToolDefinition {
        let mut properties = serde_json::Map::new();
        properties.insert(self.parameter.clone(), json!({"type": "string"}));
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": [&self.parameter]
            }),
        }
    }

    fn call_limit(&self) -> Option<u32> {
        self.call_limit
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        if ctx.is_cancelled() {
            return ToolOutcome::error(format!("'{}' cancelled before start", self.name));
        }

        let Some(input) = args.get(&self.parameter).and_then(Value::as_str) else {
            return ToolOutcome::error(format!(
                "'{}' requires a string argument '{}'",
                self.name, self.parameter
            ));
        };

        tracing::debug!(
            edge = %self.name,
            child = %self.agent.name(),
            forward_thread = self.forward_thread,
            "delegating"
        );

        let scope = RunScope {
            trace: ctx.trace.clone(),
            cancellation: ctx.cancellation.clone(),
        };

        let result = if self.forward_thread {
            let mut thread = ctx.thread.clone();
            thread.push_user(input);
            self.agent.run_thread(thread, &scope).await
        } else {
            self.agent.run(input, &[], &scope).await
        };

        match result {
            Ok(out) => ToolOutcome::success(out.text),
            Err(e) => ToolOutcome::error(format!("'{}' failed: {e}", self.name)),
        }
    }
}
