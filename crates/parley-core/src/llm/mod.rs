//! Language model abstractions.
//!
//! Defines the `LLM` trait the reasoning loop talks to, the OpenAI-compatible
//! provider and a retry wrapper that bounds how often a failed model query is
//! attempted again.

pub use crate::core_types::{ChatMessage, LLMResponse};
use crate::errors::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod providers;
pub mod retry;

pub use providers::create_llm_client;
pub use retry::RetryingLLM;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError>;
}
