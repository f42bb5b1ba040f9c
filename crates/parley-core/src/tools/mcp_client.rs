//! Tool provider channel abstraction
//!
//! A `ToolChannel` is the session with one tool provider: it lists the tools the
//! provider advertises and forwards invocations to it. The production channel
//! speaks MCP over a child process (`RMCPClient`); `MockToolChannel` is an
//! in-process stand-in for tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::spec::ToolSpec;
use crate::errors::AgentError;

#[async_trait]
pub trait ToolChannel: Send + Sync {
    /// Tools the provider currently advertises. Refreshes the cached snapshot.
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError>;
    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError>;
    async fn is_connected(&self) -> bool;
    /// Release the provider. Calling it again is a no-op.
    async fn close(&self) -> Result<(), AgentError>;
}

/// In-process channel with scripted results per tool.
///
/// Tools without a scripted result answer with a line echoing the tool name
/// and the arguments it received.
pub struct MockToolChannel {
    tools: Vec<ToolSpec>,
    responses: Mutex<HashMap<String, VecDeque<Result<String, AgentError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    connected: AtomicBool,
    close_count: AtomicUsize,
    list_delay: Duration,
}

impl MockToolChannel {
    pub fn new(tools: Vec<ToolSpec>) -> Self {
        Self {
            tools,
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            close_count: AtomicUsize::new(0),
            list_delay: Duration::ZERO,
        }
    }

    /// A channel advertising a small set of drive tools.
    pub fn drive() -> Self {
        Self::new(vec![
            ToolSpec::new(
                "list_all_files_tool",
                "List all files in the user's Google Drive",
                json!({
                    "type": "object",
                    "properties": {
                        "page_size": {"type": "integer", "default": 10, "description": "Number of files to return"}
                    }
                }),
            ),
            ToolSpec::new(
                "search_files",
                "Search files in Google Drive by name",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Text to search for"}
                    },
                    "required": ["query"]
                }),
            ),
        ])
    }

    pub fn with_response(self, tool_name: &str, result: Result<String, AgentError>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tool_name.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Make `list_tools` take `delay`, like a provider that is slow to start.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn disconnected(self) -> Self {
        self.connected.store(false, Ordering::SeqCst);
        self
    }

    /// Every call that reached the provider, with arguments after defaults.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolChannel for MockToolChannel {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AgentError::ChannelNotInitialized);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<String, AgentError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AgentError::ChannelNotInitialized);
        }

        let spec = self
            .tools
            .iter()
            .find(|t| t.name == tool_name)
            .ok_or_else(|| AgentError::ToolNotFound {
                tool_name: tool_name.to_string(),
            })?;
        let arguments = spec.prepare_arguments(arguments)?;

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((tool_name.to_string(), arguments.clone()));

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(tool_name)
            .and_then(VecDeque::pop_front);

        scripted.unwrap_or_else(|| {
            Ok(format!(
                "Mock result from {} with arguments: {}",
                tool_name, arguments
            ))
        })
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), AgentError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
