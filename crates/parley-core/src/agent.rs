//! The bounded reasoning loop.
//!
//! `Agent::process` runs one user message to a terminal `Outcome`: query the
//! model, execute the tool calls it requests, feed the observations back, and
//! stop at a final answer or after `max_steps` model queries. A run collects
//! its history entries locally and commits them to the conversation store in
//! one batch when it ends, so a run that is dropped midway leaves no trace.

use std::sync::Arc;

use futures_util::future::join_all;

use crate::config::ParleyConfig;
use crate::conversation::ConversationId;
use crate::core_types::{Message, ToolCall, ToolOutput};
use crate::errors::AgentError;
use crate::llm::LLM;
use crate::memory::{context_window, to_chat_messages, ConversationStore};
use crate::outcome::{FailureKind, Outcome};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub system_prompt: String,
    /// Most recent history entries sent with each model query.
    pub context_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            system_prompt: "You are a helpful google drive assistant.".to_string(),
            context_window: 40,
        }
    }
}

impl From<&ParleyConfig> for AgentConfig {
    fn from(config: &ParleyConfig) -> Self {
        Self {
            max_steps: config.agent.max_steps,
            system_prompt: config.agent.system_prompt.clone(),
            context_window: config.memory.context_window,
        }
    }
}

pub struct Agent {
    llm: Arc<dyn LLM>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        llm: Arc<dyn LLM>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            store,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub async fn process(&self, conversation_id: &ConversationId, message: &str) -> Outcome {
        log::info!("Processing message for conversation {}", conversation_id);

        let history = self.store.get(conversation_id).await;
        let mut run = vec![Message::user(message)];

        let outcome = self.run_loop(&history, &mut run).await;

        if let Err(e) = self.store.extend(conversation_id, run).await {
            log::error!("Failed to commit run for conversation {}: {}", conversation_id, e);
            return Outcome::failure(FailureKind::Internal, format!("could not store conversation: {}", e));
        }

        if let Outcome::Failure { kind, detail } = &outcome {
            log::warn!("Run for {} ended without an answer ({}): {}", conversation_id, kind, detail);
        }
        outcome
    }

    async fn run_loop(&self, history: &[Message], run: &mut Vec<Message>) -> Outcome {
        let tools = self.registry.list_tools();
        let tools = if tools.is_empty() { None } else { Some(tools) };

        for step in 0..self.config.max_steps {
            log::debug!("Agent step #{}", step + 1);

            let entries: Vec<Message> = history.iter().chain(run.iter()).cloned().collect();
            let window = context_window(&entries, self.config.context_window);
            let messages = to_chat_messages(&self.config.system_prompt, window);

            let response = match self.llm.generate(messages, tools.clone()).await {
                Ok(response) => response,
                Err(e) => {
                    log::error!("Model query failed at step {}: {}", step + 1, e);
                    return Outcome::failure(FailureKind::NoAnswerProduced, e.to_string());
                }
            };

            let Some(calls) = response.requested_calls() else {
                let content = response.content.unwrap_or_default();
                run.push(Message::final_answer(content.clone()));
                return Outcome::from_model_content(content);
            };

            if let Err(e) = self.execute_calls(calls, run).await {
                return Outcome::from(e);
            }
        }

        log::warn!(
            "Agent reached max_steps ({}) without a final answer.",
            self.config.max_steps
        );
        Outcome::failure(
            FailureKind::NoAnswerProduced,
            format!(
                "step limit of {} reached without a final answer",
                self.config.max_steps
            ),
        )
    }

    /// Record one action per call, run the calls concurrently, then record
    /// one observation per call in request order.
    ///
    /// Returns the first non-observable error after all observations are
    /// recorded, so every action in the run keeps its matching observation.
    async fn execute_calls(&self, calls: &[ToolCall], run: &mut Vec<Message>) -> Result<(), AgentError> {
        let calls: Vec<(String, &ToolCall)> = calls
            .iter()
            .map(|call| {
                let id = call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                (id, call)
            })
            .collect();

        for (call_id, call) in &calls {
            log::info!("Model requested tool '{}'", call.name);
            run.push(Message::AgentAction {
                call_id: call_id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }

        let results = join_all(
            calls
                .iter()
                .map(|(_, call)| self.registry.invoke(&call.name, call.arguments.clone())),
        )
        .await;

        let mut fatal = None;
        for ((call_id, call), result) in calls.iter().zip(results) {
            let output = match result {
                Ok(value) => ToolOutput::Success { value },
                Err(e) => {
                    log::warn!("Tool '{}' failed: {}", call.name, e);
                    let reason = e.to_string();
                    if !e.is_observable() && fatal.is_none() {
                        fatal = Some(e);
                    }
                    ToolOutput::Failure { reason }
                }
            };
            run.push(Message::ToolObservation {
                call_id: call_id.clone(),
                tool_name: call.name.clone(),
                output,
            });
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{LLMResponse, Role};
    use crate::memory::InMemoryConversationStore;
    use crate::outcome::ResultExtractor;
    use crate::test_utils::mocks::{call, ScriptedLLM};
    use crate::tools::{MockToolChannel, ToolChannel};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        llm: Arc<ScriptedLLM>,
        channel: Arc<MockToolChannel>,
        store: Arc<InMemoryConversationStore>,
        agent: Agent,
    }

    async fn fixture(llm: ScriptedLLM, channel: MockToolChannel, max_steps: usize) -> Fixture {
        let llm = Arc::new(llm);
        let channel = Arc::new(channel);
        let specs = channel.list_tools().await.unwrap();
        let registry = Arc::new(ToolRegistry::from_snapshot(channel.clone(), specs, 200));
        let store = Arc::new(InMemoryConversationStore::default());
        let agent = Agent::new(
            llm.clone(),
            registry,
            store.clone(),
            AgentConfig {
                max_steps,
                ..AgentConfig::default()
            },
        );
        Fixture {
            llm,
            channel,
            store,
            agent,
        }
    }

    fn conv() -> ConversationId {
        ConversationId::new("+15551234567_2024-05-01")
    }

    #[tokio::test]
    async fn test_direct_answer_without_tools() {
        let f = fixture(
            ScriptedLLM::new(vec![Ok(LLMResponse::text("Hello! How can I help?"))]),
            MockToolChannel::new(vec![]),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "hi").await;
        assert_eq!(outcome, Outcome::answer("Hello! How can I help?"));
        assert_eq!(f.llm.tools_seen(), vec![None]);
        assert_eq!(
            f.store.get(&conv()).await,
            vec![Message::user("hi"), Message::final_answer("Hello! How can I help?")]
        );
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let files = "1. Q3 report.pdf\n2. Budget.xlsx\n3. Notes.docx";
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::tool_calls(vec![call("call_1", "list_all_files_tool", json!({}))])),
                Ok(LLMResponse::text("You have 3 files: Q3 report.pdf, Budget.xlsx, Notes.docx")),
            ]),
            MockToolChannel::drive().with_response("list_all_files_tool", Ok(files.to_string())),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "list files in my drive").await;
        assert_eq!(
            ResultExtractor::extract(&outcome),
            "You have 3 files: Q3 report.pdf, Budget.xlsx, Notes.docx"
        );
        assert_eq!(
            f.channel.calls(),
            vec![("list_all_files_tool".to_string(), json!({"page_size": 10}))]
        );

        let second_query = &f.llm.requests()[1];
        let tool_message = second_query.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_message.content, files);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));

        let history = f.store.get(&conv()).await;
        assert_eq!(history.len(), 4);
        assert!(matches!(history[1], Message::AgentAction { ref call_id, .. } if call_id == "call_1"));
        assert!(matches!(history[2], Message::ToolObservation { ref output, .. } if output.is_success()));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::tool_calls(vec![call("call_1", "delete_drive", json!({}))])),
                Ok(LLMResponse::text("I can't do that.")),
            ]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "delete everything").await;
        assert_eq!(outcome, Outcome::answer("I can't do that."));

        let history = f.store.get(&conv()).await;
        match &history[2] {
            Message::ToolObservation { output: ToolOutput::Failure { reason }, .. } => {
                assert!(reason.contains("'delete_drive' not found"));
            }
            other => panic!("expected failure observation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_observation() {
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::tool_calls(vec![call("call_1", "search_files", json!({}))])),
                Ok(LLMResponse::tool_calls(vec![call("call_2", "search_files", json!({"query": "budget"}))])),
                Ok(LLMResponse::text("Found it.")),
            ]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "find the budget").await;
        assert_eq!(outcome, Outcome::answer("Found it."));
        assert_eq!(f.channel.calls().len(), 1);
        assert_eq!(f.llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_step_limit_yields_no_answer() {
        let f = fixture(
            ScriptedLLM::repeating(LLMResponse::tool_calls(vec![call(
                "call_x",
                "search_files",
                json!({"query": "again"}),
            )])),
            MockToolChannel::drive(),
            3,
        )
        .await;

        let outcome = f.agent.process(&conv(), "loop forever").await;
        assert!(matches!(
            outcome,
            Outcome::Failure { kind: FailureKind::NoAnswerProduced, .. }
        ));
        assert_eq!(f.llm.call_count(), 3);
        assert!(!ResultExtractor::extract(&outcome).is_empty());

        let history = f.store.get(&conv()).await;
        assert_eq!(history.len(), 1 + 3 * 2);
    }

    #[tokio::test]
    async fn test_transport_error_ends_run() {
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::tool_calls(vec![call("call_1", "list_all_files_tool", json!({}))])),
                Ok(LLMResponse::text("unreachable")),
            ]),
            MockToolChannel::drive().with_response(
                "list_all_files_tool",
                Err(AgentError::TransportError("broken pipe".to_string())),
            ),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "list files").await;
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::TransportError, .. }));
        assert_eq!(f.llm.call_count(), 1);

        let history = f.store.get(&conv()).await;
        assert_eq!(history.len(), 3);
        assert!(matches!(history[2], Message::ToolObservation { .. }));
    }

    #[tokio::test]
    async fn test_parallel_calls_observed_in_request_order() {
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::tool_calls(vec![
                    call("call_a", "search_files", json!({"query": "budget"})),
                    call("call_b", "list_all_files_tool", json!({"page_size": 3})),
                ])),
                Ok(LLMResponse::text("done")),
            ]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        f.agent.process(&conv(), "both").await;

        let history = f.store.get(&conv()).await;
        let order: Vec<(&str, &str)> = history
            .iter()
            .filter_map(|m| match m {
                Message::AgentAction { call_id, .. } => Some(("action", call_id.as_str())),
                Message::ToolObservation { call_id, .. } => Some(("observation", call_id.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("action", "call_a"),
                ("action", "call_b"),
                ("observation", "call_a"),
                ("observation", "call_b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_message_sees_first_answer() {
        let f = fixture(
            ScriptedLLM::new(vec![
                Ok(LLMResponse::text("You have 3 files.")),
                Ok(LLMResponse::text("The newest is Notes.docx.")),
            ]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        f.agent.process(&conv(), "how many files?").await;
        f.agent.process(&conv(), "which is newest?").await;

        let second_query = &f.llm.requests()[1];
        assert!(second_query
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == "You have 3 files."));
        assert_eq!(f.store.get(&conv()).await.len(), 4);
    }

    #[tokio::test]
    async fn test_model_failure_yields_no_answer() {
        let f = fixture(
            ScriptedLLM::new(vec![Err(AgentError::ModelQueryFailure("rate limited".to_string()))]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "hi").await;
        match outcome {
            Outcome::Failure { kind, detail } => {
                assert_eq!(kind, FailureKind::NoAnswerProduced);
                assert!(detail.contains("rate limited"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(f.store.get(&conv()).await, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_nothing() {
        let f = fixture(
            ScriptedLLM::new(vec![Ok(LLMResponse::text("late"))]).with_delay(Duration::from_secs(5)),
            MockToolChannel::drive(),
            10,
        )
        .await;

        let result = tokio::time::timeout(Duration::from_millis(50), f.agent.process(&conv(), "hi")).await;
        assert!(result.is_err());
        assert!(f.store.get(&conv()).await.is_empty());
    }

    #[tokio::test]
    async fn test_json_answer_is_structured() {
        let f = fixture(
            ScriptedLLM::new(vec![Ok(LLMResponse::text(r#"{"output": "3 files", "count": 3}"#))]),
            MockToolChannel::drive(),
            10,
        )
        .await;

        let outcome = f.agent.process(&conv(), "count").await;
        assert!(matches!(outcome, Outcome::Structured { .. }));
        assert_eq!(ResultExtractor::extract(&outcome), "3 files");
    }
}
