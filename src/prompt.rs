//! Managed system prompts.
//!
//! Instructions for every agent live in Langfuse and are fetched once, when
//! the agent graph is assembled. The service must come up even when the
//! prompt host is down, so every failure path falls back to the built-in
//! default for that agent.

use std::time::Duration;

use serde_json::Value;

use crate::error::AgentError;

/// Read-only client for the Langfuse prompt API.
pub struct PromptClient {
    http: reqwest::Client,
    host: String,
    public_key: String,
    secret_key: String,
}

impl PromptClient {
    pub fn new(
        host: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            host: host.into().trim_end_matches('/').to_string(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        })
    }

    /// Fetch the text prompt stored under `name`.
    pub async fn get_instructions(&self, name: &str) -> Result<String, AgentError> {
        let url = format!("{}/api/public/v2/prompts/{name}", self.host);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(format!("prompt fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AgentError::ProviderUnavailable(format!(
                "prompt host returned {} for '{name}'",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(format!("prompt body unreadable: {e}")))?;

        body.get("prompt")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AgentError::ProviderUnavailable(format!("prompt '{name}' is not a text prompt"))
            })
    }

    /// Fetch `name`, falling back to `default` on any failure. The service
    /// never refuses to start because the prompt host is unreachable.
    pub async fn instructions_or(&self, name: &str, default: &str) -> String {
        match self.get_instructions(name).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(prompt = name, error = %e, "using built-in instructions");
                default.to_string()
            }
        }
    }
}
