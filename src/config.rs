//! Environment configuration.
//!
//! Everything is read once at startup; a missing required variable is fatal
//! before the server binds. `.env` loading happens in the binary, ahead of
//! this module.

use std::time::Duration;

use crate::error::AgentError;
use crate::provider::ProviderConfig;

const DEEPSEEK_DEFAULT: &str = "deepseek/deepseek-chat-v3.1:free";
const Z_AI_DEFAULT: &str = "z-ai/glm-4.5-air:free";
const GEMINI_DEFAULT: &str = "google/gemini-2.5-flash-lite-preview-09-2025";

/// Main configuration for the service
#[derive(Debug, Clone)]
pub struct Config {
    /// LLM provider configuration
    pub provider: ProviderConfig,

    /// Which search backend answers web queries
    pub search: SearchConfig,

    /// Prompt host credentials
    pub prompts: PromptSettings,

    /// Static transport credential checked on every /chat request
    pub api_key: String,

    /// Per-request deadline for a full delegation run
    pub run_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum SearchConfig {
    Tavily { api_key: String },
    DuckDuckGo,
}

#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub host: String,
    pub public_key: String,
    pub secret_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AgentError> {
        let open_router_key = require("OPEN_ROUTER_KEY")?;

        let chosen = var_or("CHOSEN_MODEL", "DEEPSEEK");
        let model = match chosen.as_str() {
            "DEEPSEEK" => var_or("DEEPSEEK", DEEPSEEK_DEFAULT),
            "Z-AI" => var_or("Z-AI", Z_AI_DEFAULT),
            "GEMINI" => var_or("GEMINI", GEMINI_DEFAULT),
            other => {
                return Err(AgentError::Configuration(format!(
                    "CHOSEN_MODEL must be one of DEEPSEEK, Z-AI, GEMINI; got '{other}'"
                )))
            }
        };

        let search = match var_or("WEB_SEARCH_TOOL", "tavily").to_lowercase().as_str() {
            "tavily" => SearchConfig::Tavily {
                api_key: require("TAVILY_API_KEY")?,
            },
            "duckduckgo" => SearchConfig::DuckDuckGo,
            other => {
                return Err(AgentError::Configuration(format!(
                    "WEB_SEARCH_TOOL must be tavily or duckduckgo; got '{other}'"
                )))
            }
        };

        let prompts = PromptSettings {
            host: var_or("LANGFUSE_HOST", "https://cloud.langfuse.com"),
            public_key: require("LANGFUSE_PUBLIC_KEY")?,
            secret_key: require("LANGFUSE_SECRET_KEY")?,
        };

        let api_key = require("API_KEY")?;
        if api_key == "default_api_key" {
            return Err(AgentError::Configuration(
                "API_KEY is still the placeholder; set a real key".to_string(),
            ));
        }

        let run_timeout = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| {
                    AgentError::Configuration(format!(
                        "REQUEST_TIMEOUT_SECS must be a number of seconds; got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(120),
        };

        Ok(Self {
            provider: ProviderConfig::openrouter(open_router_key, model),
            search,
            prompts,
            api_key,
            run_timeout,
        })
    }
}

fn require(name: &str) -> Result<String, AgentError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AgentError::Configuration(format!("{name} is not set"))),
    }
}

fn var_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}
