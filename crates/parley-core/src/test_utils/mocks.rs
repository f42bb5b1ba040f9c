use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::core_types::{ChatMessage, LLMResponse, ToolCall};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};

/// Replays scripted responses in order and records every request.
pub struct ScriptedLLM {
    responses: Mutex<VecDeque<Result<LLMResponse, AgentError>>>,
    repeat: Option<LLMResponse>,
    delay: Option<Duration>,
    requests: Mutex<Vec<(Vec<ChatMessage>, Option<Vec<ToolMetadata>>)>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<Result<LLMResponse, AgentError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `response`.
    pub fn repeating(response: LLMResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(messages, _)| messages.clone())
            .collect()
    }

    pub fn tools_seen(&self) -> Vec<Option<Vec<ToolMetadata>>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, tools)| tools.clone())
            .collect()
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        self.requests.lock().unwrap().push((messages, tools));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(response) = &self.repeat {
            return Ok(response.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::ModelQueryFailure("No more mock responses".to_string())))
    }
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: Some(id.to_string()),
        name: name.to_string(),
        arguments,
    }
}
