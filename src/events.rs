//! Run instrumentation.
//!
//! A `RunTrace` is created per top-level request and shared down the
//! delegation tree, so the executed tool calls of every agent in the tree
//! land in one ordered record. Traces are instrumentation only; nothing is
//! persisted.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A tool call that was executed, recorded for instrumentation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub output: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

/// Token usage accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
    }
}

/// Shared record of everything one request did across the delegation tree.
#[derive(Debug)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    calls: Mutex<Vec<ExecutedToolCall>>,
    usage: Mutex<TokenUsage>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            calls: Mutex::new(Vec::new()),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn record_call(&self, call: ExecutedToolCall) {
        self.calls.lock().push(call);
    }

    pub fn record_usage(&self, usage: &TokenUsage) {
        self.usage.lock().add(usage);
    }

    /// Snapshot of executed calls in execution order.
    pub fn calls(&self) -> Vec<ExecutedToolCall> {
        self.calls.lock().clone()
    }

    /// Tool names in execution order, across the whole delegation tree.
    pub fn tool_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.name.clone()).collect()
    }

    pub fn usage(&self) -> TokenUsage {
        *self.usage.lock()
    }
}

impl Default for RunTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_keeps_execution_order() {
        let trace = RunTrace::new();
        for name in ["deep_research", "web_search", "summarize"] {
            trace.record_call(ExecutedToolCall {
                id: format!("call_{name}"),
                name: name.to_string(),
                arguments: json!({}),
                output: "ok".to_string(),
                is_error: false,
                duration_ms: 1,
            });
        }

        assert_eq!(trace.tool_names(), ["deep_research", "web_search", "summarize"]);
    }

    #[test]
    fn usage_accumulates() {
        let trace = RunTrace::new();
        trace.record_usage(&TokenUsage { input: 10, output: 5 });
        trace.record_usage(&TokenUsage { input: 3, output: 2 });

        assert_eq!(trace.usage(), TokenUsage { input: 13, output: 7 });
    }
}
