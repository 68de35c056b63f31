//! Model endpoint boundary.
//!
//! `ModelClient` is the only seam that performs language understanding; the
//! agent layer is written against the trait so the endpoint can be swapped
//! without touching anything above it. `OpenRouterClient` speaks the OpenAI
//! chat-completions dialect: the typed `async-openai` client for plain
//! tool-calling turns, and a raw JSON request when a strict output schema is
//! attached (the typed client has no `json_schema` response format).

use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateChatCompletionRequestArgs, CreateChatCompletionResponse};
use async_openai::Client;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::events::TokenUsage;
use crate::message::{Thread, ThreadMessage, ToolCallRequest};
use crate::provider::config::ProviderConfig;
use crate::tool::ToolSet;

/// Strict JSON schema attached to agents with typed results.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub name: String,
    pub schema: Value,
}

impl OutputSpec {
    /// Derive the schema from a type.
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
        Self {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or_default(),
        }
    }
}

/// One model invocation: instructions, the thread so far, the tools the
/// model may call, and an optional strict output schema.
pub struct ModelRequest<'a> {
    pub instructions: &'a str,
    pub thread: &'a Thread,
    pub tools: &'a ToolSet,
    pub output: Option<&'a OutputSpec>,
}

/// Tagged reply from the model: a final answer or a batch of tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Final(String),
    ToolCalls(Vec<ToolCallRequest>),
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ModelReply,
    pub usage: TokenUsage,
}

/// The model capability boundary.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(
        &self,
        request: ModelRequest<'_>,
        cancellation: &CancellationToken,
    ) -> Result<ModelResponse, AgentError>;
}

/// OpenAI-compatible client wrapper
#[derive(Clone)]
pub struct OpenRouterClient {
    config: ProviderConfig,
    client: Client<OpenAIConfig>,
    http_client: reqwest::Client,
}

impl OpenRouterClient {
    /// Create a new client from config
    pub fn new(config: ProviderConfig) -> Result<Self, AgentError> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.base_url);
        let client = Client::with_config(openai_config);

        // Connections are closed on drop rather than kept in the pool
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            http_client,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Send a non-streaming chat completion request with tools
    async fn chat_with_tools(
        &self,
        request: &ModelRequest<'_>,
        cancellation: &CancellationToken,
    ) -> Result<ModelResponse, AgentError> {
        let messages = request.thread.to_request(request.instructions);

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(&self.config.model).messages(messages);

        let tools = request.tools.to_openai_tools();
        if !tools.is_empty() {
            request_builder.tools(tools);
        }

        let chat_request = request_builder
            .build()
            .map_err(|e| AgentError::Model(format!("failed to build request: {e}")))?;

        let start = std::time::Instant::now();
        let call = self.client.chat();
        let send = call.create(chat_request);
        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(AgentError::Timeout("model call cancelled".to_string()));
            }
            result = send => {
                result.map_err(|e| AgentError::Model(format!("chat completion failed: {e}")))?
            }
        };

        let parsed = parse_chat_response(response)?;
        tracing::info!(
            target: "llm",
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            input_tokens = parsed.usage.input,
            output_tokens = parsed.usage.output,
            "chat completion finished"
        );
        Ok(parsed)
    }

    /// Send a chat completion with a strict `json_schema` response format.
    /// Goes through raw reqwest; tools are still offered so a structured
    /// agent can call capabilities before finalizing.
    async fn chat_structured(
        &self,
        request: &ModelRequest<'_>,
        spec: &OutputSpec,
        cancellation: &CancellationToken,
    ) -> Result<ModelResponse, AgentError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": wire_messages(request.instructions, request.thread),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": spec.name,
                    "strict": true,
                    "schema": spec.schema
                }
            }
        });

        let tools_json: Vec<Value> = request
            .tools
            .definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "type": "function",
                    "function": {
                        "name": def.name,
                        "description": def.description,
                        "parameters": def.parameters,
                    }
                })
            })
            .collect();
        if !tools_json.is_empty() {
            body["tools"] = Value::Array(tools_json);
        }

        let start = std::time::Instant::now();
        tracing::info!(
            target: "llm",
            schema_name = %spec.name,
            model = %self.config.model,
            message_count = request.thread.len() + 1,
            "starting structured chat completion"
        );

        let send = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();
        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(AgentError::Timeout("model call cancelled".to_string()));
            }
            result = send => result.map_err(|e| {
                tracing::error!(target: "llm", error = %e, "structured chat completion failed");
                AgentError::Model(format!("API request failed: {e}"))
            })?,
        };

        let elapsed = start.elapsed();
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                target: "llm",
                status = %status,
                error = %text,
                elapsed_ms = elapsed.as_millis() as u64,
                "structured chat completion returned error"
            );
            return Err(AgentError::Model(format!("API error {status}: {text}")));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Model(format!("failed to parse response: {e}")))?;

        let parsed = parse_raw_response(&response_body)?;
        tracing::info!(
            target: "llm",
            schema_name = %spec.name,
            model = %self.config.model,
            elapsed_ms = elapsed.as_millis() as u64,
            input_tokens = parsed.usage.input,
            output_tokens = parsed.usage.output,
            "structured chat completion finished"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn invoke(
        &self,
        request: ModelRequest<'_>,
        cancellation: &CancellationToken,
    ) -> Result<ModelResponse, AgentError> {
        match request.output {
            Some(spec) => self.chat_structured(&request, spec, cancellation).await,
            None => self.chat_with_tools(&request, cancellation).await,
        }
    }
}

fn parse_chat_response(response: CreateChatCompletionResponse) -> Result<ModelResponse, AgentError> {
    let usage = response
        .usage
        .as_ref()
        .map(|u| TokenUsage {
            input: u.prompt_tokens as u64,
            output: u.completion_tokens as u64,
        })
        .unwrap_or_default();

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::Model("response carried no choices".to_string()))?;

    if let Some(tool_calls) = choice.message.tool_calls {
        if !tool_calls.is_empty() {
            let calls = tool_calls
                .into_iter()
                .map(|call| ToolCallRequest {
                    id: call.id,
                    name: call.function.name,
                    arguments: parse_arguments(&call.function.arguments),
                })
                .collect();
            return Ok(ModelResponse {
                reply: ModelReply::ToolCalls(calls),
                usage,
            });
        }
    }

    let content = choice.message.content.unwrap_or_default();
    Ok(ModelResponse {
        reply: ModelReply::Final(content),
        usage,
    })
}

fn parse_raw_response(body: &Value) -> Result<ModelResponse, AgentError> {
    let usage_field = body.get("usage");
    let usage = TokenUsage {
        input: usage_field
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output: usage_field
            .and_then(|u| u.get("completion_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };

    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| AgentError::Model("no message in response".to_string()))?;

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        if !calls.is_empty() {
            let calls = calls
                .iter()
                .map(|call| {
                    Ok(ToolCallRequest {
                        id: call
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: call
                            .get("function")
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .ok_or_else(|| AgentError::Model("tool call without a name".to_string()))?
                            .to_string(),
                        arguments: call
                            .get("function")
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                            .map(parse_arguments)
                            .unwrap_or(Value::Null),
                    })
                })
                .collect::<Result<Vec<_>, AgentError>>()?;
            return Ok(ModelResponse {
                reply: ModelReply::ToolCalls(calls),
                usage,
            });
        }
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Model("no content in response".to_string()))?;
    Ok(ModelResponse {
        reply: ModelReply::Final(content.to_string()),
        usage,
    })
}

/// Malformed arguments surface to the tool as null, which turns into a
/// model-visible argument error rather than a failed run.
fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

/// Raw wire form of a thread, for the structured-output request path.
fn wire_messages(instructions: &str, thread: &Thread) -> Vec<Value> {
    let mut messages = vec![json!({"role": "system", "content": instructions})];
    for message in &thread.messages {
        match message {
            ThreadMessage::User { content } => {
                messages.push(json!({"role": "user", "content": content}));
            }
            ThreadMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut msg = json!({"role": "assistant"});
                if let Some(text) = content {
                    msg["content"] = json!(text);
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    msg["tool_calls"] = Value::Array(calls);
                }
                messages.push(msg);
            }
            ThreadMessage::ToolResult { call_id, content } => {
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": content,
                }));
            }
        }
    }
    messages
}

/// Scripted model double for tests: pops one reply per invocation and
/// captures every request it saw.
#[cfg(test)]
pub mod scripted {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Clone)]
    pub struct CapturedRequest {
        pub instructions: String,
        pub thread: Thread,
        pub tool_names: Vec<String>,
        pub structured: bool,
    }

    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, AgentError>>>,
        requests: Mutex<Vec<CapturedRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(Ok).collect()),
                requests: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        pub fn final_reply(text: &str) -> Self {
            Self::new([ModelReply::Final(text.to_string())])
        }

        pub fn failing(error: AgentError) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(error)])),
                requests: Mutex::new(Vec::new()),
                delay: None,
            }
        }

        /// Delay every invocation, for deadline tests.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn requests(&self) -> Vec<CapturedRequest> {
            self.requests.lock().clone()
        }

        pub fn invocations(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn invoke(
            &self,
            request: ModelRequest<'_>,
            cancellation: &CancellationToken,
        ) -> Result<ModelResponse, AgentError> {
            self.requests.lock().push(CapturedRequest {
                instructions: request.instructions.to_string(),
                thread: request.thread.clone(),
                tool_names: request.tools.names().into_iter().map(str::to_string).collect(),
                structured: request.output.is_some(),
            });

            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        return Err(AgentError::Timeout("model call cancelled".to_string()));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let reply = self
                .replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Model("script exhausted".to_string())));
            reply.map(|reply| ModelResponse {
                reply,
                usage: TokenUsage { input: 1, output: 1 },
            })
        }
    }
}
