//! Research branch: an orchestrator that searches, summarizes and reports
//! through capped delegation edges, plus its two leaf children.
//!
//! Search-adjacent agents carry the current date as an instruction fragment
//! so "latest" queries resolve against today, not the model's training
//! cutoff. The fragment renders per run.

use std::sync::Arc;

use crate::agent::{Agent, AgentTool, InstructionFragment};
use crate::error::AgentError;
use crate::prompt::PromptClient;
use crate::provider::ModelClient;
use crate::tool::Tool;

pub(crate) const RESEARCH_PROMPT_KEY: &str = "root_agent_system_prompt";
pub(crate) const WEB_SEARCH_PROMPT_KEY: &str = "web_search_agent_system_prompt";
pub(crate) const SUMMARY_PROMPT_KEY: &str = "generate_summary_agent_system_prompt";

pub(crate) const RESEARCH_DEFAULT: &str = "You are a helpful assistant. Use the tools \
    available to you to answer user queries effectively.";

pub(crate) const WEB_SEARCH_DEFAULT: &str = "You are a web search agent. Use the Web \
    Search tool to perform web searches and provide accurate information based on the \
    search results.";

pub(crate) const SUMMARY_DEFAULT: &str = "Summarize the following content concisely and \
    clearly.";

fn date_fragment() -> InstructionFragment {
    Arc::new(|| format!("The date is {}.", chrono::Local::now().format("%Y-%m-%d")))
}

/// Leaf agent that answers through the web search tool.
pub async fn build_web_search_agent(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
    search: Arc<dyn Tool>,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(WEB_SEARCH_PROMPT_KEY, WEB_SEARCH_DEFAULT)
        .await;
    let agent = Agent::builder("web_search", model)
        .with_instructions(instructions)
        .with_instruction_fragment(date_fragment())
        .with_tool(search)
        .with_call_budget(2)
        .build()?;
    Ok(Arc::new(agent))
}

/// Leaf agent that condenses whatever content it is handed.
pub async fn build_summary_agent(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(SUMMARY_PROMPT_KEY, SUMMARY_DEFAULT)
        .await;
    let agent = Agent::builder("summarizer", model)
        .with_instructions(instructions)
        .build()?;
    Ok(Arc::new(agent))
}

/// The research orchestrator. Its children start on fresh threads; they get
/// exactly the delegated input, never the conversation.
pub async fn build_research_agent(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
    web_search: Arc<Agent>,
    summarizer: Arc<Agent>,
    report: Arc<Agent>,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(RESEARCH_PROMPT_KEY, RESEARCH_DEFAULT)
        .await;
    let agent = Agent::builder("research", model)
        .with_instructions(instructions)
        .with_instruction_fragment(date_fragment())
        .with_call_budget(5)
        .with_tool(Arc::new(
            AgentTool::new(
                "web_search",
                "Use this tool to perform web searches and retrieve up-to-date \
                 information from the web.",
                "query",
                web_search,
            )
            .with_call_limit(2),
        ))
        .with_tool(Arc::new(AgentTool::new(
            "summarize",
            "Use this tool to summarize lengthy content into concise summaries.",
            "content",
            summarizer,
        )))
        .with_tool(Arc::new(
            AgentTool::new(
                "generate_final_report",
                "Use this tool to generate a final report from content assembled \
                 during research.",
                "content",
                report,
            )
            .with_call_limit(2),
        ))
        .build()?;
    Ok(Arc::new(agent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RunScope;
    use crate::provider::scripted::ScriptedModel;
    use crate::tool::{ToolContext, ToolDefinition, ToolOutcome};
    use serde_json::{json, Value};

    fn offline_prompts() -> PromptClient {
        PromptClient::new("http://127.0.0.1:9", "pk", "sk").unwrap()
    }

    struct StubSearch;

    #[async_trait::async_trait]
    impl Tool for StubSearch {
        fn name(&self) -> &str {
            "search"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "search".to_string(),
                description: "stub".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::success("no results")
        }
    }

    #[tokio::test]
    async fn research_edges_carry_their_caps() {
        let model = Arc::new(ScriptedModel::final_reply("unused"));
        let web_search = build_summary_agent(model.clone(), &offline_prompts())
            .await
            .unwrap();
        let summarizer = build_summary_agent(model.clone(), &offline_prompts())
            .await
            .unwrap();
        let report = build_summary_agent(model.clone(), &offline_prompts())
            .await
            .unwrap();

        let research =
            build_research_agent(model, &offline_prompts(), web_search, summarizer, report)
                .await
                .unwrap();

        let tools = research.tools();
        assert_eq!(
            tools.names(),
            vec!["web_search", "summarize", "generate_final_report"]
        );
        assert_eq!(tools.get("web_search").unwrap().call_limit(), Some(2));
        assert_eq!(tools.get("summarize").unwrap().call_limit(), None);
        assert_eq!(
            tools.get("generate_final_report").unwrap().call_limit(),
            Some(2)
        );
        assert_eq!(research.call_budget(), Some(5));
    }

    #[tokio::test]
    async fn web_search_agent_sees_the_current_date() {
        let model = Arc::new(ScriptedModel::final_reply("ok"));
        let search: Arc<dyn Tool> = Arc::new(StubSearch);
        let agent = build_web_search_agent(model.clone(), &offline_prompts(), search)
            .await
            .unwrap();

        agent
            .run("what happened today", &[], &RunScope::new())
            .await
            .unwrap();

        let instructions = &model.requests()[0].instructions;
        let today = format!("The date is {}.", chrono::Local::now().format("%Y-%m-%d"));
        assert!(instructions.ends_with(&today));
        assert!(instructions.starts_with("You are a web search agent."));
    }
}
