//! Web search.
//!
//! `SearchProvider` abstracts the upstream engine; the tool holds a primary
//! provider and an optional fallback. A failing primary is not an error the
//! model ever sees as long as the fallback can answer.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolOutcome};

const TAVILY_URL: &str = "https://api.tavily.com";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com";

#[derive(Debug, Clone)]
pub struct SearchSnippet {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize)
        -> Result<Vec<SearchSnippet>, AgentError>;
}

/// Tavily search API client.
pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: TAVILY_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchSnippet>, AgentError> {
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({"query": query, "max_results": limit}))
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(format!("tavily request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AgentError::ProviderUnavailable(format!(
                "tavily returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(format!("tavily body unreadable: {e}")))?;

        let snippets = body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(limit)
                    .map(|result| SearchSnippet {
                        title: result
                            .get("title")
                            .and_then(Value::as_str)
                            .unwrap_or("Untitled")
                            .to_string(),
                        url: result
                            .get("url")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        content: result
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(snippets)
    }
}

/// DuckDuckGo instant-answer client. Needs no API key, which is what makes
/// it a usable fallback when the keyed provider is down.
pub struct DuckDuckGoSearch {
    http: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new() -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: DUCKDUCKGO_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchSnippet>, AgentError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| {
                AgentError::ProviderUnavailable(format!("duckduckgo request failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(AgentError::ProviderUnavailable(format!(
                "duckduckgo returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            AgentError::ProviderUnavailable(format!("duckduckgo body unreadable: {e}"))
        })?;

        let mut snippets = Vec::new();
        let abstract_text = body.get("AbstractText").and_then(Value::as_str).unwrap_or("");
        if !abstract_text.is_empty() {
            snippets.push(SearchSnippet {
                title: body
                    .get("Heading")
                    .and_then(Value::as_str)
                    .unwrap_or("Summary")
                    .to_string(),
                url: body
                    .get("AbstractURL")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: abstract_text.to_string(),
            });
        }

        if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
            for topic in topics {
                if snippets.len() >= limit {
                    break;
                }
                // Grouped topics nest under "Topics" and carry no Text.
                let (Some(text), Some(url)) = (
                    topic.get("Text").and_then(Value::as_str),
                    topic.get("FirstURL").and_then(Value::as_str),
                ) else {
                    continue;
                };
                if text.is_empty() {
                    continue;
                }
                snippets.push(SearchSnippet {
                    title: text.split(" - ").next().unwrap_or(text).to_string(),
                    url: url.to_string(),
                    content: text.to_string(),
                });
            }
        }

        Ok(snippets)
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

/// Web search as a tool, with provider failover.
pub struct SearchTool {
    primary: Box<dyn SearchProvider>,
    fallback: Option<Box<dyn SearchProvider>>,
}

impl SearchTool {
    pub fn new(primary: Box<dyn SearchProvider>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn SearchProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    async fn run_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchSnippet>, AgentError> {
        match self.primary.search(query, limit).await {
            Ok(snippets) => Ok(snippets),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(AgentError::ToolCallFailure(primary_err.to_string()));
                };
                tracing::debug!(
                    provider = self.primary.name(),
                    error = %primary_err,
                    "search provider failed, trying fallback"
                );
                fallback.search(query, limit).await.map_err(|fallback_err| {
                    AgentError::ToolCallFailure(format!(
                        "{}: {primary_err}; {}: {fallback_err}",
                        self.primary.name(),
                        fallback.name()
                    ))
                })
            }
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search".to_string(),
            description: "Search the web for current information. Returns titles, URLs \
                          and content snippets for the top results."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results, default 5"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return ToolOutcome::error(format!("invalid arguments: {e}")),
        };
        if ctx.is_cancelled() {
            return ToolOutcome::error("search cancelled");
        }

        match self.run_search(&args.query, args.limit).await {
            Ok(snippets) if snippets.is_empty() => ToolOutcome::success("No results found."),
            Ok(snippets) => ToolOutcome::success(render_snippets(&snippets)),
            Err(e) => ToolOutcome::error(e.to_string()),
        }
    }
}

fn render_snippets(snippets: &[SearchSnippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("### {}\nURL: {}\n{}", s.title, s.url, s.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunTrace;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_ctx() -> ToolContext {
        ToolContext::new(
            crate::message::Thread::new(),
            Arc::new(RunTrace::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn tavily_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer tv-key"))
            .and(body_partial_json(json!({"query": "rust lang"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"title": "Rust", "url": "https://rust-lang.org", "content": "A language"},
                    {"title": "Book", "url": "https://doc.rust-lang.org", "content": "Learn it"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = TavilySearch::new("tv-key").unwrap().with_base_url(server.uri());
        let snippets = provider.search("rust lang", 5).await.unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].title, "Rust");
        assert_eq!(snippets[1].url, "https://doc.rust-lang.org");
    }

    #[tokio::test]
    async fn duckduckgo_parses_abstract_and_topics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "rust"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Heading": "Rust (programming language)",
                "AbstractText": "Rust is a systems language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
                "RelatedTopics": [
                    {"Text": "Cargo - The Rust package manager", "FirstURL": "https://crates.io"},
                    {"Topics": [{"Text": "nested group, skipped"}]}
                ]
            })))
            .mount(&server)
            .await;

        let provider = DuckDuckGoSearch::new().unwrap().with_base_url(server.uri());
        let snippets = provider.search("rust", 5).await.unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].title, "Rust (programming language)");
        assert_eq!(snippets[1].title, "Cargo");
        assert_eq!(snippets[1].url, "https://crates.io");
    }

    #[tokio::test]
    async fn failing_primary_falls_back_silently() {
        let tavily_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&tavily_server)
            .await;

        let ddg_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Heading": "Answer",
                "AbstractText": "From the fallback.",
                "AbstractURL": "https://example.org",
                "RelatedTopics": []
            })))
            .mount(&ddg_server)
            .await;

        let tool = SearchTool::new(Box::new(
            TavilySearch::new("tv-key").unwrap().with_base_url(tavily_server.uri()),
        ))
        .with_fallback(Box::new(
            DuckDuckGoSearch::new().unwrap().with_base_url(ddg_server.uri()),
        ));

        let outcome = tool.execute(json!({"query": "anything"}), &test_ctx()).await;
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("From the fallback."));
    }

    #[tokio::test]
    async fn both_providers_failing_is_a_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let tool = SearchTool::new(Box::new(
            TavilySearch::new("tv-key").unwrap().with_base_url(server.uri()),
        ))
        .with_fallback(Box::new(
            DuckDuckGoSearch::new().unwrap().with_base_url(server.uri()),
        ));

        let outcome = tool.execute(json!({"query": "anything"}), &test_ctx()).await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("tool call failed"));
        assert!(outcome.content.contains("tavily"));
        assert!(outcome.content.contains("duckduckgo"));
    }

    #[tokio::test]
    async fn empty_results_are_reported_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let tool = SearchTool::new(Box::new(
            TavilySearch::new("tv-key").unwrap().with_base_url(server.uri()),
        ));
        let outcome = tool.execute(json!({"query": "anything"}), &test_ctx()).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.content, "No results found.");
    }

    #[test]
    fn snippets_render_as_markdown_sections() {
        let rendered = render_snippets(&[
            SearchSnippet {
                title: "One".to_string(),
                url: "https://one.example".to_string(),
                content: "first".to_string(),
            },
            SearchSnippet {
                title: "Two".to_string(),
                url: "https://two.example".to_string(),
                content: "second".to_string(),
            },
        ]);
        assert!(rendered.starts_with("### One\nURL: https://one.example\nfirst"));
        assert!(rendered.contains("\n\n### Two\n"));
    }
}
