//! The delegation graph.
//!
//! Six agents in a fixed topology:
//!
//! ```text
//! router -> deep_research (forwards thread, cap 5) -> research
//!        -> excel_queries (forwards thread)         -> excel
//! research -> web_search (cap 2) -> web_search agent -> search tool
//!          -> summarize          -> summarizer
//!          -> generate_final_report (cap 2) -> final_report
//! excel -> evaluate_formula
//! ```
//!
//! Instructions are fetched from the prompt host once, here, at assembly.

use std::sync::Arc;

mod excel;
mod report;
mod research;
mod router;

pub use excel::{build_excel_agent, ExcelAnswer};
pub use report::{build_report_agent, ReportAnswer};
pub use research::{build_research_agent, build_summary_agent, build_web_search_agent};
pub use router::build_router;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::prompt::PromptClient;
use crate::provider::ModelClient;
use crate::tool::Tool;

/// The assembled graph. Everything dispatches through the router.
pub struct AgentGraph {
    pub router: Arc<Agent>,
}

pub async fn build_graph(
    model: Arc<dyn ModelClient>,
    prompts: &PromptClient,
    search: Arc<dyn Tool>,
) -> Result<AgentGraph, AgentError> {
    let report = build_report_agent(model.clone(), prompts).await?;
    let summarizer = build_summary_agent(model.clone(), prompts).await?;
    let web_search = build_web_search_agent(model.clone(), prompts, search).await?;
    let research = build_research_agent(
        model.clone(),
        prompts,
        web_search,
        summarizer,
        report,
    )
    .await?;
    let excel = build_excel_agent(model.clone(), prompts).await?;
    let router = build_router(model, prompts, research, excel).await?;

    tracing::info!(
        edges = ?router.tools().names(),
        "agent graph assembled"
    );
    Ok(AgentGraph { router })
}
