//! Excel agent: answers spreadsheet questions with worked instructions and
//! checks arithmetic through the formula tool instead of in prose.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::error::AgentError;
use crate::prompt::PromptClient;
use crate::provider::{ModelClient, OutputSpec};
use crate::tools::FormulaTool;

pub(crate) const PROMPT_KEY: &str = "excel_agent_system_prompt";

pub(crate) const DEFAULT_INSTRUCTIONS: &str = "You are a Master of Microsoft's Excel. You \
    know how to solve any excel related question as if your life depends on it. The output \
    should contains examples of instructions for excel.";

/// Structured shape of an excel answer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExcelAnswer {
    /// What the requested operation does.
    pub description: String,
    /// Step-by-step instructions, including formulas where relevant.
    pub instructions: String,
}

pub async fn build_excel_agent(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
) -> Result<Arc<Agent>, AgentError> {
    let instructions = prompts
        .instructions_or(PROMPT_KEY, DEFAULT_INSTRUCTIONS)
        .await;
    let agent = Agent::builder("excel", model)
        .with_instructions(instructions)
        .with_tool(Arc::new(FormulaTool))
        .with_output(OutputSpec::of::<ExcelAnswer>("excel_answer"))
        .build()?;
    Ok(Arc::new(agent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::RunScope;
    use crate::provider::scripted::ScriptedModel;
    use crate::provider::ModelReply;
    use serde_json::json;

    fn offline_prompts() -> PromptClient {
        PromptClient::new("http://127.0.0.1:9", "pk", "sk").unwrap()
    }

    #[tokio::test]
    async fn carries_formula_tool_and_output_schema() {
        let model = Arc::new(ScriptedModel::final_reply(
            "{\"description\":\"d\",\"instructions\":\"i\"}",
        ));
        let agent = build_excel_agent(model.clone(), &offline_prompts())
            .await
            .unwrap();

        assert_eq!(agent.tools().names(), vec!["evaluate_formula"]);

        let out = agent.run("sum a column", &[], &RunScope::new()).await.unwrap();
        assert_eq!(out.structured.unwrap()["description"], "d");
        assert!(model.requests()[0].structured);
    }

    #[tokio::test]
    async fn formula_round_trip_through_the_agent() {
        let model = Arc::new(ScriptedModel::new([
            ModelReply::ToolCalls(vec![crate::message::ToolCallRequest {
                id: "c1".to_string(),
                name: "evaluate_formula".to_string(),
                arguments: json!({"formula": "=SUM(2, 3) * 2"}),
            }]),
            ModelReply::Final("{\"description\":\"doubled sum\",\"instructions\":\"use =SUM\"}".to_string()),
        ]));
        let agent = build_excel_agent(model, &offline_prompts()).await.unwrap();

        let scope = RunScope::new();
        let out = agent.run("double the sum of 2 and 3", &[], &scope).await.unwrap();

        assert_eq!(out.structured.unwrap()["description"], "doubled sum");
        let calls = scope.trace.calls();
        assert_eq!(calls[0].name, "evaluate_formula");
        assert_eq!(calls[0].output, "10");
    }
}
