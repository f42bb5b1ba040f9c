//! Bounded retry around a model client.
//!
//! Every failed `generate` is attempted again up to `max_retries` times with a
//! linearly growing pause. When all attempts fail the last error is returned as
//! a `ModelQueryFailure` so the reasoning loop can end the run cleanly.

use crate::core_types::{ChatMessage, LLMResponse};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RetryingLLM {
    inner: Arc<dyn LLM>,
    max_retries: usize,
    backoff: Duration,
}

impl RetryingLLM {
    pub fn new(inner: Arc<dyn LLM>) -> Self {
        Self {
            inner,
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl LLM for RetryingLLM {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(messages.clone(), tools.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        log::info!("Model query succeeded on retry {}", attempt);
                    }
                    return Ok(response);
                }
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "Model query failed (attempt {}/{}): {}",
                        attempt,
                        self.max_retries + 1,
                        error
                    );
                    tokio::time::sleep(self.backoff * attempt as u32).await;
                }
                Err(error) => {
                    log::error!(
                        "Model query failed after {} attempts: {}",
                        attempt + 1,
                        error
                    );
                    return Err(match error {
                        AgentError::ModelQueryFailure(_) => error,
                        other => AgentError::ModelQueryFailure(other.to_string()),
                    });
                }
            }
        }
    }
}
