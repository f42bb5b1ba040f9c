//! Error types for the agent session and tool-orchestration core
//!
//! A single error enum covers every failure mode of a run: the tool provider
//! channel, argument validation, the language model and configuration. Variants
//! are grouped by where a failure is surfaced: some become observations that the
//! model can react to, others end the current run with a diagnostic.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Tool provider channel is not initialized")]
    ChannelNotInitialized,
    #[error("Tool provider transport failed: {0}")]
    TransportError(String),
    #[error("Tool '{tool_name}' not found")]
    ToolNotFound { tool_name: String },
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },
    #[error("Tool '{tool_name}' reported an error: {message}")]
    RemoteToolError { tool_name: String, message: String },
    #[error("Language model query failed: {0}")]
    ModelQueryFailure(String),
    #[error("No answer produced: {0}")]
    NoAnswerProduced(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Startup failed: {0}")]
    StartupError(String),
    #[error("Agent is not ready")]
    NotReady,
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AgentError {
    /// Whether the failure is reported back to the model as a tool observation
    /// instead of ending the run.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound { .. }
                | AgentError::InvalidArguments { .. }
                | AgentError::RemoteToolError { .. }
        )
    }

    pub fn invalid_arguments(tool_name: &str, message: impl Into<String>) -> Self {
        AgentError::InvalidArguments {
            tool_name: tool_name.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::ModelQueryFailure(err.to_string())
    }
}
