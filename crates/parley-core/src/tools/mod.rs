//! Tool handles and the registry the reasoning loop dispatches through.
//!
//! The tool set is fixed by the provider's advertised snapshot: one `MCPTool`
//! per `ToolSpec`, each bound to the shared channel. Arguments are checked
//! locally against the tool's declared parameters and JSON schema before
//! anything is sent to the provider.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tiktoken_rs::p50k_base;

use crate::config::McpServerConfig;
use crate::errors::AgentError;
use crate::llm::ToolMetadata;

pub mod mcp_client;
pub mod rmcp_client;
pub mod spec;

pub use mcp_client::{MockToolChannel, ToolChannel};
pub use rmcp_client::RMCPClient;
pub use spec::{ParamKind, ParamSpec, ToolSpec};

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;
    fn spec(&self) -> &ToolSpec;
    async fn execute(&self, arguments: Value) -> Result<String, AgentError>;
}

pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// One `MCPTool` per advertised spec, all sharing `channel`.
    pub fn from_snapshot(
        channel: Arc<dyn ToolChannel>,
        specs: Vec<ToolSpec>,
        description_token_limit: u32,
    ) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register_tool(Arc::new(MCPTool::new(
                channel.clone(),
                spec,
                description_token_limit,
            )));
        }
        registry
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("Tool '{}' advertised twice; keeping the last definition", name);
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Metadata for every tool, ordered by name.
    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|tool| tool.metadata()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<String, AgentError> {
        let tool = self.get_tool(name).ok_or_else(|| AgentError::ToolNotFound {
            tool_name: name.to_string(),
        })?;
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MCPTool {
    channel: Arc<dyn ToolChannel>,
    spec: ToolSpec,
    validator: Option<JSONSchema>,
    description_token_limit: u32,
}

impl MCPTool {
    pub fn new(channel: Arc<dyn ToolChannel>, spec: ToolSpec, description_token_limit: u32) -> Self {
        let validator = match JSONSchema::compile(&spec.input_schema) {
            Ok(schema) => Some(schema),
            Err(e) => {
                log::warn!(
                    "Input schema of tool '{}' does not compile, checking declared parameters only: {}",
                    spec.name,
                    e
                );
                None
            }
        };
        Self {
            channel,
            spec,
            validator,
            description_token_limit,
        }
    }

    fn validate(&self, arguments: &Value) -> Result<(), AgentError> {
        let Some(schema) = &self.validator else {
            return Ok(());
        };
        if let Err(errors) = schema.validate(arguments) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(AgentError::invalid_arguments(&self.spec.name, messages.join("; ")));
        }
        Ok(())
    }
}

#[async_trait]
impl Tool for MCPTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.spec.name.clone(),
            description: truncate_to_tokens(&self.spec.description, self.description_token_limit, None),
            input_schema: self.spec.input_schema.clone(),
        }
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, arguments: Value) -> Result<String, AgentError> {
        let arguments = self.spec.prepare_arguments(arguments)?;
        self.validate(&arguments)?;
        log::debug!("Invoking tool '{}' with {}", self.spec.name, arguments);
        self.channel.call_tool(&self.spec.name, arguments).await
    }
}

pub struct MCPToolFactory {
    channel: Arc<dyn ToolChannel>,
    description_token_limit: u32,
}

impl MCPToolFactory {
    pub fn new(channel: Arc<dyn ToolChannel>, description_token_limit: u32) -> Self {
        Self {
            channel,
            description_token_limit,
        }
    }

    pub async fn discover_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        let specs = self.channel.list_tools().await?;
        log::info!(
            "Discovered {} tools: {:?}",
            specs.len(),
            specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );
        Ok(specs)
    }

    pub async fn create_registry(&self) -> Result<ToolRegistry, AgentError> {
        let specs = self.discover_tools().await?;
        Ok(ToolRegistry::from_snapshot(
            self.channel.clone(),
            specs,
            self.description_token_limit,
        ))
    }
}

/// What a tool provider advertises, as seen by a one-off connection.
#[derive(Debug, Clone)]
pub struct ProviderListing {
    pub server_info: String,
    pub tools: Vec<ToolMetadata>,
}

/// Start the provider, list its tools and shut it down again.
///
/// Only the provider section of the configuration is involved, so no model
/// credentials are needed.
pub async fn inspect_provider(config: &McpServerConfig) -> Result<ProviderListing, AgentError> {
    let client = RMCPClient::connect(config).await?;
    let server_info = client.server_info().to_string();

    let channel: Arc<dyn ToolChannel> = Arc::new(client);
    let listed = MCPToolFactory::new(channel.clone(), config.description_token_limit)
        .create_registry()
        .await;
    if let Err(e) = channel.close().await {
        log::warn!("Failed to close tool provider '{}': {}", config.name, e);
    }

    Ok(ProviderListing {
        server_info,
        tools: listed?.list_tools(),
    })
}

/// Cut `text` to at most `limit` p50k tokens, appending `marker` when cut.
///
/// Text is returned unchanged if the tokenizer is unavailable.
pub(crate) fn truncate_to_tokens(text: &str, limit: u32, marker: Option<&str>) -> String {
    let bpe = match p50k_base() {
        Ok(bpe) => bpe,
        Err(e) => {
            log::warn!("Tokenizer unavailable, skipping truncation: {}", e);
            return text.to_string();
        }
    };

    let limit = limit as usize;
    let mut tokens = bpe.encode_with_special_tokens(text);
    if tokens.len() <= limit {
        return text.to_string();
    }

    let marker = marker.unwrap_or("");
    let marker_tokens = if marker.is_empty() {
        0
    } else {
        bpe.encode_with_special_tokens(marker).len()
    };
    tokens.truncate(limit.saturating_sub(marker_tokens));

    // a cut can land inside a multi-byte character
    let mut head = loop {
        match bpe.decode(tokens.clone()) {
            Ok(decoded) => break decoded,
            Err(_) if !tokens.is_empty() => {
                tokens.pop();
            }
            Err(_) => break String::new(),
        }
    };

    let mut truncated = format!("{}{}", head, marker);
    while bpe.encode_with_special_tokens(&truncated).len() > limit && head.pop().is_some() {
        truncated = format!("{}{}", head, marker);
    }
    truncated
}
