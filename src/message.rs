//! Semantic message types for conversation state.
//!
//! History turns and the in-flight thread are stored as semantic structures,
//! not wire format. `Thread::to_request()` generates the model wire format on
//! every request, so instruction text can be swapped without touching stored
//! state.

use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a stored conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One completed history entry for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A message in the in-flight thread of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadMessage {
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// The message thread of one run: seeded from stored history, extended as
/// the model and tools take turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub messages: Vec<ThreadMessage>,
}

impl Thread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a thread from a user's stored history.
    pub fn seeded(history: &[Turn]) -> Self {
        let messages = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => ThreadMessage::User {
                    content: turn.content.clone(),
                },
                Role::Assistant => ThreadMessage::Assistant {
                    content: Some(turn.content.clone()),
                    tool_calls: Vec::new(),
                },
            })
            .collect();
        Self { messages }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ThreadMessage::User {
            content: content.into(),
        });
    }

    /// Record the assistant message that carried a batch of tool calls.
    pub fn push_tool_calls(&mut self, calls: &[ToolCallRequest]) {
        self.messages.push(ThreadMessage::Assistant {
            content: None,
            tool_calls: calls.to_vec(),
        });
    }

    pub fn push_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.messages.push(ThreadMessage::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Convert to model wire format. Instructions are passed separately so
    /// the same thread can be replayed under different prompts.
    pub fn to_request(&self, instructions: &str) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);

        if let Ok(msg) = ChatCompletionRequestSystemMessageArgs::default()
            .content(instructions)
            .build()
        {
            messages.push(msg.into());
        }

        for message in &self.messages {
            match message {
                ThreadMessage::User { content } => {
                    if let Ok(msg) = ChatCompletionRequestUserMessageArgs::default()
                        .content(content.clone())
                        .build()
                    {
                        messages.push(msg.into());
                    }
                }
                ThreadMessage::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if let Some(text) = content {
                        builder.content(text.clone());
                    }
                    if !tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCall> = tool_calls
                            .iter()
                            .map(|call| ChatCompletionMessageToolCall {
                                id: call.id.clone(),
                                r#type: async_openai::types::ChatCompletionToolType::Function,
                                function: async_openai::types::FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect();
                        builder.tool_calls(calls);
                    }
                    if let Ok(msg) = builder.build() {
                        messages.push(msg.into());
                    }
                }
                ThreadMessage::ToolResult { call_id, content } => {
                    let content = if content.is_empty() {
                        "<tool returned an empty string>".to_string()
                    } else {
                        content.clone()
                    };
                    if let Ok(msg) = ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call_id.clone())
                        .content(content)
                        .build()
                    {
                        messages.push(msg.into());
                    }
                }
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeded_thread_converts_history() {
        let history = vec![Turn::user("Hello"), Turn::assistant("Hi there!")];
        let thread = Thread::seeded(&history);

        let messages = thread.to_request("You are a helpful assistant.");
        assert_eq!(messages.len(), 3); // system, user, assistant
    }

    #[test]
    fn tool_call_round_produces_wire_pairs() {
        let mut thread = Thread::new();
        thread.push_user("What is the weather?");
        let call = ToolCallRequest {
            id: "call_123".to_string(),
            name: "search".to_string(),
            arguments: json!({"query": "weather"}),
        };
        thread.push_tool_calls(std::slice::from_ref(&call));
        thread.push_tool_result("call_123", "sunny");

        let messages = thread.to_request("instructions");
        // system, user, assistant (with tool_calls), tool result
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn empty_tool_result_is_padded() {
        let mut thread = Thread::new();
        thread.push_tool_result("call_1", "");

        let messages = thread.to_request("instructions");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn turn_constructors_set_roles() {
        assert_eq!(Turn::user("a").role, Role::User);
        assert_eq!(Turn::assistant("b").role, Role::Assistant);
    }
}
