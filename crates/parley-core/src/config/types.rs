//! Configuration type definitions
//!
//! Everything the lifecycle manager needs at `initialize()` time: the tool
//! provider command, model identity and credentials, loop bounds, memory
//! retention and the conversation bucketing policy. All sections except `llm`
//! have defaults so a minimal YAML file only names the model and the provider
//! command.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::conversation::BucketPolicy;
use crate::errors::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub agent: AgentDefinition,
    pub llm: LlmConfig,
    pub tool_provider: McpServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_model_retries")]
    pub model_retries: usize,
    /// Seconds a whole `process()` call may take.
    #[serde(default = "default_run_timeout")]
    pub run_timeout: u64,
}

impl Default for AgentDefinition {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            max_steps: default_max_steps(),
            model_retries: default_model_retries(),
            run_timeout: default_run_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

/// LLM provider types.
///
/// In YAML this is either the bare name `openai` or a map
/// `custom: { base_url: ... }` for any OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(try_from = "ProviderRepr", into = "ProviderRepr")]
pub enum LlmProvider {
    #[default]
    OpenAI,
    Custom {
        base_url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ProviderRepr {
    Name(String),
    Custom { custom: CustomEndpoint },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CustomEndpoint {
    base_url: String,
}

impl TryFrom<ProviderRepr> for LlmProvider {
    type Error = String;

    fn try_from(repr: ProviderRepr) -> Result<Self, Self::Error> {
        match repr {
            ProviderRepr::Name(name) => match name.trim().to_lowercase().as_str() {
                "openai" => Ok(LlmProvider::OpenAI),
                "custom" => Err("provider 'custom' needs a base_url: use `custom: { base_url: ... }`".to_string()),
                other => Err(format!("unknown LLM provider '{}'", other)),
            },
            ProviderRepr::Custom { custom } => Ok(LlmProvider::Custom {
                base_url: custom.base_url,
            }),
        }
    }
}

impl From<LlmProvider> for ProviderRepr {
    fn from(provider: LlmProvider) -> Self {
        match provider {
            LlmProvider::OpenAI => ProviderRepr::Name("openai".to_string()),
            LlmProvider::Custom { base_url } => ProviderRepr::Custom {
                custom: CustomEndpoint { base_url },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

impl Default for LlmAuth {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Tool provider (MCP server) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    pub command: McpCommand,
    /// Seconds allowed for a single list_tools or call_tool round-trip.
    #[serde(default = "default_mcp_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default = "default_mcp_description_token_limit")]
    pub description_token_limit: u32,
}

/// MCP command configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpCommand {
    pub run: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_mcp_token_limit")]
    pub token_limit: u32,
}

/// Conversation memory retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Most recent history entries rendered into each model query.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Conversations kept before the least recently used one is evicted; 0 keeps all.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            max_conversations: default_max_conversations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConversationConfig {
    #[serde(default)]
    pub bucket: BucketPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub env_files: Vec<PathBuf>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub const MAX_STEPS_LIMIT: usize = 50;

impl ParleyConfig {
    /// A configuration with defaults everywhere except the provider command.
    pub fn with_command(run: &str, args: &[&str]) -> Self {
        Self {
            agent: AgentDefinition::default(),
            llm: LlmConfig {
                provider: LlmProvider::default(),
                model: default_model(),
                parameters: ModelParameters::default(),
                auth: LlmAuth::default(),
            },
            tool_provider: McpServerConfig {
                name: default_provider_name(),
                command: McpCommand {
                    run: run.to_string(),
                    args: args.iter().map(|s| s.to_string()).collect(),
                    token_limit: default_mcp_token_limit(),
                    ..Default::default()
                },
                timeout: default_mcp_timeout(),
                max_concurrent_calls: default_max_concurrent_calls(),
                description_token_limit: default_mcp_description_token_limit(),
            },
            memory: MemoryConfig::default(),
            conversation: ConversationConfig::default(),
            environment: EnvironmentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.name.trim().is_empty() {
            return Err(AgentError::ConfigError("agent.name must not be empty".to_string()));
        }
        if self.agent.max_steps == 0 || self.agent.max_steps > MAX_STEPS_LIMIT {
            return Err(AgentError::ConfigError(format!(
                "agent.max_steps must be between 1 and {}, got {}",
                MAX_STEPS_LIMIT, self.agent.max_steps
            )));
        }
        if self.agent.run_timeout == 0 {
            return Err(AgentError::ConfigError("agent.run_timeout must be positive".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::ConfigError("llm.model must not be empty".to_string()));
        }
        if let LlmProvider::Custom { base_url } = &self.llm.provider {
            if base_url.is_empty() {
                return Err(AgentError::ConfigError(
                    "Custom provider requires a valid 'base_url'".to_string(),
                ));
            }
        }
        if self.tool_provider.command.run.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "tool_provider.command.run must not be empty".to_string(),
            ));
        }
        if self.tool_provider.max_concurrent_calls == 0 {
            return Err(AgentError::ConfigError(
                "tool_provider.max_concurrent_calls must be at least 1".to_string(),
            ));
        }
        if self.tool_provider.timeout == 0 {
            return Err(AgentError::ConfigError("tool_provider.timeout must be positive".to_string()));
        }
        Ok(())
    }
}

fn default_agent_name() -> String { "drive-assistant".to_string() }
fn default_system_prompt() -> String { "You are a helpful google drive assistant.".to_string() }
fn default_max_steps() -> usize { 10 }
fn default_model_retries() -> usize { 2 }
fn default_run_timeout() -> u64 { 120 }
fn default_model() -> String { "gpt-4o".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_api_key_env() -> Option<String> { Some("OPENAI_API_KEY".to_string()) }
fn default_provider_name() -> String { "gdrive".to_string() }
fn default_mcp_timeout() -> u64 { 30 }
fn default_max_concurrent_calls() -> usize { 1 }
fn default_mcp_description_token_limit() -> u32 { 200 }
fn default_mcp_token_limit() -> u32 { 4000 }
fn default_context_window() -> usize { 40 }
fn default_max_conversations() -> usize { 1000 }
fn default_log_level() -> String { "info".to_string() }
