//! MCP channel over a child process, built on `rmcp`.
//!
//! The client spawns the configured tool provider, completes the MCP
//! `initialize` handshake and then serves `list_tools`/`call_tool` through a
//! semaphore so at most `max_concurrent_calls` requests are in flight on the
//! pipe at once. Every request is bounded by the configured timeout.

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParam, Content, ErrorCode, RawContent, ResourceContents, Tool},
    service::{DynService, Peer, RunningService, ServiceError, ServiceExt},
    transport::TokioChildProcess,
    RoleClient,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock, Semaphore};

use super::mcp_client::ToolChannel;
use super::spec::ToolSpec;
use super::truncate_to_tokens;
use crate::config::{McpCommand, McpServerConfig};
use crate::errors::AgentError;

const TRUNCATION_MESSAGE: &str = " [...TRUNCATED...]";
const EMPTY_RESULT: &str = "Tool executed successfully (no content returned)";

type ClientService = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

pub struct RMCPClient {
    service: Mutex<Option<ClientService>>,
    peer: Peer<RoleClient>,
    closed: AtomicBool,
    gate: Semaphore,
    snapshot: RwLock<Option<Vec<ToolSpec>>>,
    request_timeout: Duration,
    token_limit: u32,
    server_info: String,
}

impl RMCPClient {
    pub async fn new(command: &str, args: &[&str]) -> Result<Self, AgentError> {
        let mcp_command = McpCommand {
            run: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            token_limit: 4000,
            ..Default::default()
        };
        Self::new_with_mcp_command(&mcp_command, Duration::from_secs(30), 1).await
    }

    pub async fn connect(config: &McpServerConfig) -> Result<Self, AgentError> {
        log::info!("Connecting to tool provider '{}'", config.name);
        Self::new_with_mcp_command(
            &config.command,
            Duration::from_secs(config.timeout),
            config.max_concurrent_calls,
        )
        .await
    }

    pub async fn new_with_mcp_command(
        mcp_command: &McpCommand,
        request_timeout: Duration,
        max_concurrent_calls: usize,
    ) -> Result<Self, AgentError> {
        log::info!(
            "Starting MCP server with command: {} {:?}",
            mcp_command.run,
            mcp_command.args
        );

        let mut cmd = Command::new(&mcp_command.run);
        cmd.args(&mcp_command.args).kill_on_drop(true);

        if let Some(working_dir) = &mcp_command.working_dir {
            log::info!("Setting working directory: {}", working_dir.display());
            cmd.current_dir(working_dir);
        }

        if !mcp_command.env.is_empty() {
            log::info!("Setting {} environment variables for MCP server", mcp_command.env.len());
            for (key, value) in &mcp_command.env {
                log::debug!("   {}={}", key, redact(key, value));
                cmd.env(key, value);
            }
        }

        let transport = TokioChildProcess::new(cmd).map_err(|e| {
            AgentError::StartupError(format!(
                "Failed to spawn tool provider '{}': {}",
                mcp_command.run, e
            ))
        })?;

        let service_handler: Box<dyn DynService<RoleClient>> = Box::new(());
        let service = tokio::time::timeout(request_timeout, service_handler.serve(transport))
            .await
            .map_err(|_| {
                log::error!("MCP initialize handshake timed out after {:?}", request_timeout);
                AgentError::StartupError(format!(
                    "Tool provider '{}' did not complete the MCP handshake within {:?}",
                    mcp_command.run, request_timeout
                ))
            })?
            .map_err(|e| {
                log::error!("MCP initialize handshake failed: {}", e);
                AgentError::StartupError(format!("MCP handshake failed: {}", e))
            })?;

        let server_info = format!("{:?}", service.peer_info());
        log::info!("Connected to MCP server: {}", server_info);

        Ok(Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            closed: AtomicBool::new(false),
            gate: Semaphore::new(max_concurrent_calls.max(1)),
            snapshot: RwLock::new(None),
            request_timeout,
            token_limit: mcp_command.token_limit,
            server_info,
        })
    }

    pub fn server_info(&self) -> &str {
        &self.server_info
    }

    fn ensure_open(&self) -> Result<(), AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::ChannelNotInitialized);
        }
        Ok(())
    }

    async fn lookup(&self, tool_name: &str) -> Result<ToolSpec, AgentError> {
        let cached = self.snapshot.read().await.clone();
        let tools = match cached {
            Some(tools) => tools,
            None => self.list_tools().await?,
        };
        tools
            .into_iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| AgentError::ToolNotFound {
                tool_name: tool_name.to_string(),
            })
    }
}

fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    let upper = key.to_uppercase();
    if upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET") {
        "***REDACTED***"
    } else {
        value
    }
}

fn convert_tool(tool: &Tool) -> ToolSpec {
    ToolSpec::new(
        tool.name.to_string(),
        tool.description.as_deref().unwrap_or(""),
        Value::Object(tool.input_schema.as_ref().clone()),
    )
}

fn map_service_error(tool_name: &str, error: ServiceError) -> AgentError {
    match error {
        ServiceError::McpError(e) if e.code == ErrorCode::INVALID_PARAMS => {
            AgentError::invalid_arguments(tool_name, e.message.to_string())
        }
        ServiceError::McpError(e) => AgentError::RemoteToolError {
            tool_name: tool_name.to_string(),
            message: e.message.to_string(),
        },
        other => AgentError::TransportError(format!("Call to '{}' failed: {}", tool_name, other)),
    }
}

/// Flatten MCP content blocks to one text, one block per line.
fn flatten_content(content: &[Content]) -> String {
    if content.is_empty() {
        return EMPTY_RESULT.to_string();
    }

    content
        .iter()
        .map(|c| match &c.raw {
            RawContent::Text(text_content) => text_content.text.clone(),
            RawContent::Image(image) => {
                format!("Image ({}, {} bytes)", image.mime_type, image.data.len())
            }
            RawContent::Resource(resource) => match &resource.resource {
                ResourceContents::TextResourceContents { uri, text, .. } => {
                    format!("Resource: {}\n{}", uri, text)
                }
                ResourceContents::BlobResourceContents { uri, .. } => format!("Resource: {}", uri),
            },
            RawContent::Audio(audio) => {
                format!("Audio ({}, {} bytes)", audio.mime_type, audio.data.len())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolChannel for RMCPClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        self.ensure_open()?;
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AgentError::ChannelNotInitialized)?;

        let response = tokio::time::timeout(self.request_timeout, self.peer.list_tools(Default::default()))
            .await
            .map_err(|_| {
                log::error!("MCP list_tools timed out after {:?}", self.request_timeout);
                AgentError::TransportError("Timeout waiting for list_tools response".to_string())
            })?
            .map_err(|e| {
                log::error!("MCP list_tools failed: {}", e);
                AgentError::TransportError(format!("Failed to list tools: {}", e))
            })?;

        let tools: Vec<ToolSpec> = response.tools.iter().map(convert_tool).collect();
        log::debug!("Listed {} tools from MCP server", tools.len());

        *self.snapshot.write().await = Some(tools.clone());
        Ok(tools)
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError> {
        self.ensure_open()?;
        let spec = self.lookup(tool_name).await?;
        let arguments = spec.prepare_arguments(arguments)?;

        let request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments: arguments.as_object().cloned(),
        };

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AgentError::ChannelNotInitialized)?;

        let result = tokio::time::timeout(self.request_timeout, self.peer.call_tool(request))
            .await
            .map_err(|_| {
                AgentError::TransportError(format!(
                    "Timeout after {:?} waiting for tool '{}'",
                    self.request_timeout, tool_name
                ))
            })?
            .map_err(|e| map_service_error(tool_name, e))?;

        let text = truncate_to_tokens(
            &flatten_content(&result.content),
            self.token_limit,
            Some(TRUNCATION_MESSAGE),
        );

        if result.is_error.unwrap_or(false) {
            log::warn!("Tool '{}' reported an error", tool_name);
            return Err(AgentError::RemoteToolError {
                tool_name: tool_name.to_string(),
                message: text,
            });
        }

        log::debug!("Tool '{}' executed successfully", tool_name);
        Ok(text)
    }

    async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.gate.close();

        if let Some(service) = self.service.lock().await.take() {
            service
                .cancel()
                .await
                .map_err(|e| AgentError::TransportError(format!("Failed to stop tool provider: {}", e)))?;
        }
        log::info!("Disconnected from MCP server");
        Ok(())
    }
}

impl Drop for RMCPClient {
    fn drop(&mut self) {
        if let Some(service) = self.service.get_mut().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = service.cancel().await {
                            log::warn!("Failed to cancel MCP service during drop: {}", e);
                        }
                    });
                }
                Err(_) => log::warn!("MCP client dropped outside a runtime; child process left to exit on its own"),
            }
        }
    }
}
