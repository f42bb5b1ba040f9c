//! Terminal outcomes of a run and their rendering to a reply string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotReady,
    TransportError,
    NoAnswerProduced,
    Timeout,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::NotReady => "not ready",
            FailureKind::TransportError => "tool provider unavailable",
            FailureKind::NoAnswerProduced => "no answer produced",
            FailureKind::Timeout => "timed out",
            FailureKind::Internal => "internal error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    FinalAnswer { text: String },
    Structured { value: Value },
    Failure { kind: FailureKind, detail: String },
}

impl Outcome {
    pub fn answer(text: impl Into<String>) -> Self {
        Outcome::FinalAnswer { text: text.into() }
    }

    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            detail: detail.into(),
        }
    }

    /// Final model content: JSON objects and arrays become `Structured`.
    pub fn from_model_content(content: String) -> Self {
        let trimmed = content.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                if value.is_object() || value.is_array() {
                    return Outcome::Structured { value };
                }
            }
        }
        Outcome::FinalAnswer { text: content }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }
}

impl From<AgentError> for Outcome {
    fn from(err: AgentError) -> Self {
        let kind = match &err {
            AgentError::NotReady | AgentError::ChannelNotInitialized => FailureKind::NotReady,
            AgentError::TransportError(_) => FailureKind::TransportError,
            AgentError::ModelQueryFailure(_) | AgentError::NoAnswerProduced(_) => {
                FailureKind::NoAnswerProduced
            }
            _ => FailureKind::Internal,
        };
        Outcome::failure(kind, err.to_string())
    }
}

/// Maps an `Outcome` to the single string handed back to the sender.
pub struct ResultExtractor;

impl ResultExtractor {
    /// Never returns an empty string.
    pub fn extract(outcome: &Outcome) -> String {
        match outcome {
            Outcome::FinalAnswer { text } if text.trim().is_empty() => {
                "Error: no answer produced: the model returned an empty answer".to_string()
            }
            Outcome::FinalAnswer { text } => text.clone(),
            Outcome::Structured { value } => Self::extract_structured(value),
            Outcome::Failure { kind, detail } if detail.trim().is_empty() => {
                format!("Error: {}", kind)
            }
            Outcome::Failure { kind, detail } => format!("Error: {}: {}", kind, detail),
        }
    }

    fn extract_structured(value: &Value) -> String {
        for field in ["output", "answer"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
        value.to_string()
    }
}
