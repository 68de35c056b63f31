//! Switchboard - a multi-agent research and spreadsheet assistant
//!
//! This crate provides:
//! - A routing agent that delegates to research and spreadsheet specialists
//! - Per-user conversation history with serialized turn appends
//! - An HTTP/WebSocket transport with static-key auth
//!
//! The routing topology is assembled in [`agents::build_graph`]; the server
//! entry point lives in [`server`].

pub mod chat;
pub mod config;
pub mod history;
pub mod message;
pub mod prompt;
pub mod server;
pub mod telemetry;

// Agent system
pub mod agent;
pub mod agents;
pub mod error;
pub mod events;
pub mod provider;
pub mod tool;
pub mod tools;

pub use chat::{ChatReply, ChatService};
pub use config::{Config, PromptSettings, SearchConfig};
pub use error::AgentError;
pub use history::HistoryStore;
pub use prompt::PromptClient;
pub use telemetry::Telemetry;

pub use agent::{Agent, AgentBuilder, AgentTool, RunOutput, RunScope};
pub use agents::{build_graph, AgentGraph};
pub use events::{RunTrace, TokenUsage};
pub use message::{Role, Thread, Turn};
pub use provider::{ModelClient, ModelReply, ModelRequest, OpenRouterClient, ProviderConfig};
