//! Core type definitions shared by the reasoning loop, memory and model client
//!
//! Two families of types live here. `ChatMessage`, `ToolCall` and `LLMResponse`
//! form the wire contract with the language model and follow OpenAI's function
//! calling format. `Message` is the conversation history entry persisted per
//! conversation: user input, tool actions, their observations and final answers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: Some(calls),
            finish_reason: None,
            usage: None,
        }
    }

    /// Requested tool calls, treating an empty list as no request.
    pub fn requested_calls(&self) -> Option<&[ToolCall]> {
        self.tool_calls
            .as_deref()
            .filter(|calls| !calls.is_empty())
    }
}

/// Result of one tool invocation as recorded in conversation history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutput {
    Success { value: String },
    Failure { reason: String },
}

impl ToolOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutput::Success { .. })
    }

    pub fn as_text(&self) -> &str {
        match self {
            ToolOutput::Success { value } => value,
            ToolOutput::Failure { reason } => reason,
        }
    }
}

/// One entry of a conversation history, in production order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    UserMessage {
        text: String,
    },
    AgentAction {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolObservation {
        call_id: String,
        tool_name: String,
        output: ToolOutput,
    },
    FinalAnswer {
        text: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::UserMessage { text: text.into() }
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        Message::FinalAnswer { text: text.into() }
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, Message::UserMessage { .. })
    }
}
