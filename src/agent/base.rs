//! Agent core - the model dispatch loop
//!
//! An agent owns instructions, a model handle, a tool set, and an optional
//! strict output schema. A run walks one loop:
//! 1. Invoke the model with the thread so far
//! 2. Final reply: finalize (decode structured output if a schema is attached)
//! 3. Tool calls: execute each one, append results, re-invoke
//!
//! The loop is bounded by the agent's own call budget; delegation edges are
//! additionally capped per run by the `DelegationLedger`. An agent knows
//! nothing about users, history, or transport. That lives in `ChatService`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::budget::DelegationLedger;
use crate::error::AgentError;
use crate::events::{ExecutedToolCall, RunTrace, TokenUsage};
use crate::message::{Thread, ToolCallRequest, Turn};
use crate::provider::{ModelClient, ModelReply, ModelRequest, OutputSpec};
use crate::tool::{summarize_args, Tool, ToolContext, ToolOutcome, ToolSet};

/// Ceiling on model invocations for agents without an explicit budget.
/// Guards against a model that never stops calling tools.
const MAX_MODEL_CALLS: u32 = 50;

/// Instructions rendered fresh on every run, appended after the base text.
/// Used for anything that must not go stale, like the current date.
pub type InstructionFragment = Arc<dyn Fn() -> String + Send + Sync>;

/// Shared state for one run and everything it delegates to.
#[derive(Clone)]
pub struct RunScope {
    pub trace: Arc<RunTrace>,
    pub cancellation: CancellationToken,
}

impl RunScope {
    pub fn new() -> Self {
        Self {
            trace: Arc::new(RunTrace::new()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            trace: Arc::new(RunTrace::new()),
            cancellation,
        }
    }
}

impl Default for RunScope {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final reply text. For structured agents this is the raw JSON string.
    pub text: String,
    /// Decoded output for agents with a schema attached.
    pub structured: Option<Value>,
    /// Tokens spent by this agent's own model calls.
    pub usage: TokenUsage,
}

/// One node in the delegation graph.
pub struct Agent {
    name: String,
    instructions: String,
    fragments: Vec<InstructionFragment>,
    model: Arc<dyn ModelClient>,
    tools: ToolSet,
    call_budget: Option<u32>,
    output: Option<OutputSpec>,
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: Arc<dyn ModelClient>) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            model,
            instructions: String::new(),
            fragments: Vec::new(),
            tools: Vec::new(),
            call_budget: None,
            output: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn call_budget(&self) -> Option<u32> {
        self.call_budget
    }

    /// Run against `input` with prior turns seeded into a fresh thread.
    pub async fn run(
        &self,
        input: &str,
        history: &[Turn],
        scope: &RunScope,
    ) -> Result<RunOutput, AgentError> {
        let mut thread = Thread::seeded(history);
        thread.push_user(input);
        self.run_thread(thread, scope).await
    }

    /// Run on an already-built thread. Delegation edges that forward the
    /// parent's thread enter here.
    pub(crate) async fn run_thread(
        &self,
        mut thread: Thread,
        scope: &RunScope,
    ) -> Result<RunOutput, AgentError> {
        let instructions = self.instructions_for_run();
        let budget = self.call_budget.unwrap_or(MAX_MODEL_CALLS);
        let mut ledger = DelegationLedger::new();
        let mut usage = TokenUsage::default();

        for _invocation in 0..budget {
            if scope.cancellation.is_cancelled() {
                return Err(AgentError::Timeout(format!(
                    "run cancelled for agent '{}'",
                    self.name
                )));
            }

            let response = self
                .model
                .invoke(
                    ModelRequest {
                        instructions: &instructions,
                        thread: &thread,
                        tools: &self.tools,
                        output: self.output.as_ref(),
                    },
                    &scope.cancellation,
                )
                .await?;

            usage.add(&response.usage);
            scope.trace.record_usage(&response.usage);

            match response.reply {
                ModelReply::Final(text) => {
                    let structured = match &self.output {
                        Some(spec) => Some(decode_structured(&self.name, &spec.name, &text)?),
                        None => None,
                    };
                    return Ok(RunOutput {
                        text,
                        structured,
                        usage,
                    });
                }
                ModelReply::ToolCalls(calls) => {
                    // Forwarded threads must contain only complete rounds, so
                    // the snapshot is taken before the assistant message
                    // carrying these calls goes onto the thread.
                    let snapshot = thread.clone();
                    thread.push_tool_calls(&calls);

                    for call in &calls {
                        if scope.cancellation.is_cancelled() {
                            return Err(AgentError::Timeout(format!(
                                "run cancelled for agent '{}'",
                                self.name
                            )));
                        }

                        let start = Instant::now();
                        let outcome = self.dispatch(call, &snapshot, &mut ledger, scope).await;
                        scope.trace.record_call(ExecutedToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            output: outcome.content.clone(),
                            is_error: outcome.is_error,
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                        thread.push_tool_result(&call.id, &outcome.content);
                    }
                }
            }
        }

        Err(AgentError::BudgetExceeded {
            agent: self.name.clone(),
        })
    }

    /// Resolve one tool call to an outcome. Unknown names and refused
    /// charges become model-visible errors; the run itself continues.
    async fn dispatch(
        &self,
        call: &ToolCallRequest,
        snapshot: &Thread,
        ledger: &mut DelegationLedger,
        scope: &RunScope,
    ) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(agent = %self.name, tool = %call.name, "model called unknown tool");
            return ToolOutcome::error(format!("unknown tool '{}'", call.name));
        };

        if !ledger.try_charge(&call.name, tool.call_limit()) {
            let limit = tool.call_limit().unwrap_or(0);
            return ToolOutcome::error(format!(
                "call budget exhausted for '{}': limit {limit} reached",
                call.name
            ));
        }

        tracing::debug!(
            agent = %self.name,
            tool = %call.name,
            args = %summarize_args(&call.arguments),
            "executing tool"
        );

        let ctx = ToolContext::new(
            snapshot.clone(),
            scope.trace.clone(),
            scope.cancellation.clone(),
        );
        tool.execute(call.arguments.clone(), &ctx).await
    }

    fn instructions_for_run(&self) -> String {
        let mut text = self.instructions.clone();
        for fragment in &self.fragments {
            let rendered = fragment();
            if !rendered.is_empty() {
                text.push_str("\n\n");
                text.push_str(&rendered);
            }
        }
        text
    }
}

fn decode_structured(agent: &str, schema: &str, text: &str) -> Result<Value, AgentError> {
    serde_json::from_str(text).map_err(|e| {
        AgentError::Model(format!(
            "agent '{agent}' returned invalid JSON for schema '{schema}': {e}"
        ))
    })
}

/// Builder for [`Agent`]. Fails at build time when two tools share a name.
pub struct AgentBuilder {
    name: String,
    model: Arc<dyn ModelClient>,
    instructions: String,
    fragments: Vec<InstructionFragment>,
    tools: Vec<Arc<dyn Tool>>,
    call_budget: Option<u32>,
    output: Option<OutputSpec>,
}

impl AgentBuilder {
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_instruction_fragment(mut self, fragment: InstructionFragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_call_budget(mut self, budget: u32) -> Self {
        self.call_budget = Some(budget);
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let mut tools = ToolSet::new();
        for tool in self.tools {
            tools.register(tool)?;
        }
        Ok(Agent {
            name: self.name,
            instructions: self.instructions,
            fragments: self.fragments,
            model: self.model,
            tools,
            call_budget: self.call_budget,
            output: self.output,
        })
    }
}
