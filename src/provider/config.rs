//! Provider configuration

use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible model endpoint. The API key is
/// resolved once at startup, never re-read per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name for the provider
    pub name: String,
    /// API base URL (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// Resolved API key
    pub api_key: String,
    /// Model identifier sent with every request
    pub model: String,
}

impl ProviderConfig {
    /// Create an OpenRouter provider config
    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "OpenRouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Create a custom provider config (e.g., a local gateway or a test server)
    pub fn custom(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}
