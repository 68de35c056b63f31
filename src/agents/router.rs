//! Router: first line for every user request. It owns no capability tools,
//! only the two delegation edges, and both edges forward the conversation
//! thread so the specialists see what the user actually asked.

use std::sync::Arc;

use crate::agent::{Agent, AgentTool};
use crate::error::AgentError;
use crate::prompt::PromptClient;
use crate::provider::ModelClient;

pub(crate) const PROMPT_KEY: &str = "rooting_agent_system_prompt";

pub(crate) const DEFAULT_INSTRUCTIONS: &str = "You are the first line regarding a user \
    request. Evaluate where the request should be redirected based on the content of the \
    request. You have 2 different tools. A deep research agent. And an excel agent that \
    can help with excel related tasks. If the request is related to excel, or data \
    analysis, or anything that can be done in excel, redirect the request to the excel \
    agent. If the request is related to research, or general questions, or anything that \
    requires looking up information, redirect the request to the research agent.";

pub async fn build_router(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
    research: Arc<Agent>,
    excel: Arc<Agent>,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(PROMPT_KEY, DEFAULT_INSTRUCTIONS)
        .await;
    let agent = Agent::builder("router", model)
        .with_instructions(instructions)
        .with_tool(Arc::new(
            AgentTool::new(
                "deep_research",
                "Use this tool to perform deep research calls.",
                "query",
                research,
            )
            .with_call_limit(5)
            .forwarding_thread(),
        ))
        .with_tool(Arc::new(
            AgentTool::new(
                "excel_queries",
                "Use this tool to handle excel specific queries.",
                "content",
                excel,
            )
            .forwarding_thread(),
        ))
        .build()?;
    Ok(Arc::new(agent))
}
