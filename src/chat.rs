//! Conversation service.
//!
//! Ties the router, per-user history and the run deadline together. This is
//! the layer the transport talks to; agents below it know nothing about
//! users, and the transport above it knows nothing about delegation.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, RunScope};
use crate::error::AgentError;
use crate::events::RunTrace;
use crate::history::HistoryStore;
use crate::message::Turn;

/// Reply for a run that died of budget exhaustion. The user gets a usable
/// answer; the incident goes to the logs, not the transcript.
const BUDGET_REPLY: &str = "I wasn't able to complete that request within my processing \
    limits. Try narrowing the question or splitting it in two.";

pub struct ChatService {
    router: Arc<Agent>,
    history: Arc<HistoryStore>,
    run_timeout: Duration,
}

/// What a handled message produced.
#[derive(Debug)]
pub struct ChatReply {
    pub reply: String,
    pub trace: Arc<RunTrace>,
}

impl ChatService {
    pub fn new(router: Arc<Agent>, history: Arc<HistoryStore>, run_timeout: Duration) -> Self {
        Self {
            router,
            history,
            run_timeout,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Handle one user message. With a user id the exchange is recorded;
    /// without one the run is session-scoped and leaves no trace in history.
    pub async fn handle(
        &self,
        message: &str,
        user_id: Option<&str>,
    ) -> Result<ChatReply, AgentError> {
        match user_id {
            Some(user_id) => self.run_for_user(message, user_id).await,
            None => self.run_detached(message).await,
        }
    }

    async fn run_for_user(&self, message: &str, user_id: &str) -> Result<ChatReply, AgentError> {
        // The lock spans read, run and append: a concurrent request for the
        // same user sees either none or all of this exchange.
        let mut turns = self.history.lock(user_id).await;
        let snapshot = turns.clone();
        let scope = RunScope::new();

        match self.run_with_deadline(message, &snapshot, &scope).await {
            Ok(text) => {
                turns.push(Turn::user(message));
                turns.push(Turn::assistant(text.as_str()));
                let usage = scope.trace.usage();
                tracing::info!(
                    user = user_id,
                    tools = ?scope.trace.tool_names(),
                    input_tokens = usage.input,
                    output_tokens = usage.output,
                    "chat run finished"
                );
                Ok(ChatReply {
                    reply: text,
                    trace: scope.trace,
                })
            }
            // A blown budget degrades to a canned reply. The failed run
            // contributes nothing to history.
            Err(AgentError::BudgetExceeded { agent }) => {
                tracing::warn!(user = user_id, agent = %agent, "run exhausted its call budget");
                Ok(ChatReply {
                    reply: BUDGET_REPLY.to_string(),
                    trace: scope.trace,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn run_detached(&self, message: &str) -> Result<ChatReply, AgentError> {
        let scope = RunScope::new();
        match self.run_with_deadline(message, &[], &scope).await {
            Ok(text) => {
                let usage = scope.trace.usage();
                tracing::info!(
                    tools = ?scope.trace.tool_names(),
                    input_tokens = usage.input,
                    output_tokens = usage.output,
                    "detached chat run finished"
                );
                Ok(ChatReply {
                    reply: text,
                    trace: scope.trace,
                })
            }
            Err(AgentError::BudgetExceeded { agent }) => {
                tracing::warn!(agent = %agent, "run exhausted its call budget");
                Ok(ChatReply {
                    reply: BUDGET_REPLY.to_string(),
                    trace: scope.trace,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn run_with_deadline(
        &self,
        message: &str,
        history: &[Turn],
        scope: &RunScope,
    ) -> Result<String, AgentError> {
        let run = self.router.run(message, history, scope);
        match tokio::time::timeout(self.run_timeout, run).await {
            Ok(result) => result.map(|out| out.text),
            Err(_) => {
                // Everything downstream of this run observes the token and
                // stops, including in-flight model calls.
                scope.cancellation.cancel();
                Err(AgentError::Timeout(format!(
                    "run exceeded {}s deadline",
                    self.run_timeout.as_secs()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolCallRequest};
    use crate::provider::scripted::ScriptedModel;
    use crate::provider::ModelReply;
    use serde_json::json;

    fn service_with(model: Arc<ScriptedModel>) -> ChatService {
        let router = Arc::new(Agent::builder("router", model).build().unwrap());
        ChatService::new(
            router,
            Arc::new(HistoryStore::new()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn successful_run_appends_both_turns() {
        let service = service_with(Arc::new(ScriptedModel::final_reply("the answer")));

        let reply = service.handle("the question", Some("alice")).await.unwrap();
        assert_eq!(reply.reply, "the answer");

        let turns = service.history().turns("alice").await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user("the question"));
        assert_eq!(turns[1], Turn::assistant("the answer"));
    }

    #[tokio::test]
    async fn failed_run_appends_nothing() {
        let service = service_with(Arc::new(ScriptedModel::failing(AgentError::Model(
            "endpoint is down".to_string(),
        ))));

        let err = service.handle("hello", Some("alice")).await.unwrap_err();
        assert!(matches!(err, AgentError::Model(_)));
        assert!(service.history().turns("alice").await.is_empty());
    }

    #[tokio::test]
    async fn blown_budget_degrades_and_appends_nothing() {
        // One invocation allowed; the model spends it asking for a tool, so
        // the run ends in budget exhaustion.
        let model = Arc::new(ScriptedModel::new([ModelReply::ToolCalls(vec![
            ToolCallRequest {
                id: "c1".to_string(),
                name: "anything".to_string(),
                arguments: json!({}),
            },
        ])]));
        let router = Arc::new(
            Agent::builder("router", model)
                .with_call_budget(1)
                .build()
                .unwrap(),
        );
        let service = ChatService::new(
            router,
            Arc::new(HistoryStore::new()),
            Duration::from_secs(5),
        );

        let reply = service.handle("hello", Some("alice")).await.unwrap();
        assert_eq!(reply.reply, BUDGET_REPLY);
        assert!(service.history().turns("alice").await.is_empty());
    }

    #[tokio::test]
    async fn deadline_cancels_the_run() {
        let model = Arc::new(
            ScriptedModel::final_reply("too slow").with_delay(Duration::from_millis(500)),
        );
        let router = Arc::new(Agent::builder("router", model).build().unwrap());
        let service = ChatService::new(
            router,
            Arc::new(HistoryStore::new()),
            Duration::from_millis(50),
        );

        let err = service.handle("hello", Some("alice")).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        assert!(err.to_string().contains("deadline"));
        assert!(service.history().turns("alice").await.is_empty());
    }

    #[tokio::test]
    async fn absent_user_id_persists_nothing() {
        let model = Arc::new(ScriptedModel::new([
            ModelReply::Final("first".to_string()),
            ModelReply::Final("second".to_string()),
        ]));
        let service = service_with(model.clone());

        service.handle("detached question", None).await.unwrap();
        service.handle("tracked question", Some("alice")).await.unwrap();

        // The tracked run saw no seeded history from the detached one.
        assert_eq!(model.requests()[1].thread.len(), 1);
        assert_eq!(service.history().turns("alice").await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_same_user_exchanges_stay_paired() {
        let model = Arc::new(
            ScriptedModel::new([
                ModelReply::Final("reply one".to_string()),
                ModelReply::Final("reply two".to_string()),
            ])
            .with_delay(Duration::from_millis(20)),
        );
        let service = Arc::new(service_with(model));

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("first", Some("bob")).await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.handle("second", Some("bob")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let turns = service.history().turns("bob").await;
        assert_eq!(turns.len(), 4);
        // Whole exchanges, never interleaved halves.
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[2].role, Role::User);
        assert_eq!(turns[3].role, Role::Assistant);
    }
}
