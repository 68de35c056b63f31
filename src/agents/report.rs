//! Final report agent: turns assembled research material into an executive
//! summary with structured fields.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::AgentError;
use crate::prompt::PromptClient;
use crate::provider::{ModelClient, OutputSpec};

pub(crate) const PROMPT_KEY: &str = "final_report_agent_system_prompt";

pub(crate) const DEFAULT_INSTRUCTIONS: &str = "Your task is to create executive summaries \
    and detailed reports based on the data provided. The data comes from assembly of \
    different agents.";

/// Structured shape of a final report.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReportAnswer {
    /// Executive summary followed by the detailed report body.
    pub report: String,
    /// Suggested follow-up work.
    pub next_steps: String,
    /// Which agents contributed and what they did.
    pub agent_actions: String,
}

pub async fn build_report_agent(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(PROMPT_KEY, DEFAULT_INSTRUCTIONS)
        .await;
    let agent = Agent::builder("final_report", model)
        .with_instructions(instructions)
        .with_call_budget(2)
        .with_output(OutputSpec::of::<ReportAnswer>("final_report"))
        .build()?;
    Ok(Arc::new(agent))
}
