//! Switchboard server
//!
//! Loads configuration from the environment, assembles the agent graph, and
//! serves it over HTTP and WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use switchboard::server::{self, AppState};
use switchboard::tools::{DuckDuckGoSearch, SearchTool, TavilySearch};
use switchboard::{
    agents, telemetry, ChatService, Config, HistoryStore, OpenRouterClient, PromptClient,
    SearchConfig,
};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Multi-agent research and spreadsheet assistant", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Directory for JSON log files (console-only when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Emit console logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_dir.as_deref(), cli.json_logs)?;

    let config = Config::from_env()?;

    let model = Arc::new(OpenRouterClient::new(config.provider.clone())?);
    let prompts = PromptClient::new(
        config.prompts.host.clone(),
        config.prompts.public_key.clone(),
        config.prompts.secret_key.clone(),
    )?;

    let search = match &config.search {
        SearchConfig::Tavily { api_key } => {
            // Tavily is primary; DuckDuckGo picks up queries when it fails.
            SearchTool::new(Box::new(TavilySearch::new(api_key.clone())?))
                .with_fallback(Box::new(DuckDuckGoSearch::new()?))
        }
        SearchConfig::DuckDuckGo => SearchTool::new(Box::new(DuckDuckGoSearch::new()?)),
    };

    let graph = agents::build_graph(model, &prompts, Arc::new(search)).await?;

    let history = Arc::new(HistoryStore::new());
    let chat = Arc::new(ChatService::new(graph.router, history, config.run_timeout));
    let state = AppState {
        chat,
        api_key: config.api_key.clone(),
    };

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    server::serve(state, addr).await
}
