//! Agent session and its lifecycle.
//!
//! An `AgentSession` bundles one open tool channel, the registry built from its
//! snapshot, the model client and the reasoning loop. `LifecycleManager` owns
//! at most one session and is the entry point the transport layer calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::agent::{Agent, AgentConfig};
use crate::config::ParleyConfig;
use crate::conversation::ConversationId;
use crate::errors::AgentError;
use crate::llm::{create_llm_client, RetryingLLM, LLM};
use crate::memory::{ConversationStore, InMemoryConversationStore};
use crate::outcome::{FailureKind, Outcome, ResultExtractor};
use crate::tools::{MCPToolFactory, RMCPClient, ToolChannel};

pub struct AgentSession {
    channel: Arc<dyn ToolChannel>,
    agent: Agent,
}

impl AgentSession {
    /// Build the model client, spawn the tool provider and discover its tools.
    pub async fn open(config: &ParleyConfig) -> Result<Self, AgentError> {
        let llm = create_llm_client(&config.llm)?;
        let channel: Arc<dyn ToolChannel> = Arc::new(RMCPClient::connect(&config.tool_provider).await?);
        Self::from_parts(config, channel, llm).await
    }

    /// Assemble a session around an already open channel and model client.
    pub async fn from_parts(
        config: &ParleyConfig,
        channel: Arc<dyn ToolChannel>,
        llm: Arc<dyn LLM>,
    ) -> Result<Self, AgentError> {
        let factory = MCPToolFactory::new(channel.clone(), config.tool_provider.description_token_limit);
        let registry = match factory.create_registry().await {
            Ok(registry) => registry,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    log::warn!("Failed to close tool provider after discovery error: {}", close_err);
                }
                return Err(AgentError::StartupError(format!("Tool discovery failed: {}", e)));
            }
        };

        let llm: Arc<dyn LLM> = Arc::new(RetryingLLM::new(llm).with_max_retries(config.agent.model_retries));
        let store: Arc<dyn ConversationStore> =
            Arc::new(InMemoryConversationStore::new(config.memory.max_conversations));

        log::info!(
            "Agent '{}' ready with {} tools",
            config.agent.name,
            registry.tool_count()
        );

        Ok(Self {
            channel,
            agent: Agent::new(llm, Arc::new(registry), store, AgentConfig::from(config)),
        })
    }

    pub async fn process(&self, conversation_id: &ConversationId, message: &str) -> Outcome {
        self.agent.process(conversation_id, message).await
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub async fn close(&self) -> Result<(), AgentError> {
        self.channel.close().await
    }
}

pub struct LifecycleManager {
    config: ParleyConfig,
    session: RwLock<Option<Arc<AgentSession>>>,
    starting: Mutex<()>,
}

impl LifecycleManager {
    pub fn new(config: ParleyConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            starting: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Open the session. Calling it again while ready does nothing.
    pub async fn initialize(&self) -> Result<(), AgentError> {
        self.install(AgentSession::open(&self.config)).await
    }

    /// Open the session around injected collaborators.
    pub async fn initialize_with(
        &self,
        channel: Arc<dyn ToolChannel>,
        llm: Arc<dyn LLM>,
    ) -> Result<(), AgentError> {
        self.install(AgentSession::from_parts(&self.config, channel, llm))
            .await
    }

    /// Build a session and publish it. The slot is only write-locked for the
    /// final swap, so `process` keeps answering "not ready" during startup.
    async fn install<F>(&self, build: F) -> Result<(), AgentError>
    where
        F: Future<Output = Result<AgentSession, AgentError>>,
    {
        let _starting = self.starting.lock().await;
        if self.is_ready().await {
            log::warn!("initialize() called on a ready session; ignoring");
            return Ok(());
        }

        let session = build.await.map_err(|e| {
            log::error!("Failed to initialize agent session: {}", e);
            e
        })?;
        *self.session.write().await = Some(Arc::new(session));
        Ok(())
    }

    pub async fn is_ready(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session(&self) -> Option<Arc<AgentSession>> {
        self.session.read().await.clone()
    }

    /// Close the tool channel. Waits for an initialize in progress; a no-op if
    /// never initialized.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        let _starting = self.starting.lock().await;
        let session = self.session.write().await.take();
        match session {
            Some(session) => {
                log::info!("Shutting down agent session");
                session.close().await
            }
            None => Ok(()),
        }
    }

    pub async fn process_outcome(&self, conversation_id: &ConversationId, message: &str) -> Outcome {
        let session = self.session.read().await.clone();
        let Some(session) = session else {
            return Outcome::failure(
                FailureKind::NotReady,
                "the assistant is not initialized yet, please try again shortly",
            );
        };

        let limit = Duration::from_secs(self.config.agent.run_timeout);
        match tokio::time::timeout(limit, session.process(conversation_id, message)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!(
                    "Run for conversation {} exceeded {} seconds",
                    conversation_id,
                    self.config.agent.run_timeout
                );
                Outcome::failure(
                    FailureKind::Timeout,
                    format!("no answer within {} seconds", self.config.agent.run_timeout),
                )
            }
        }
    }

    pub async fn process(&self, conversation_id: &ConversationId, message: &str) -> String {
        ResultExtractor::extract(&self.process_outcome(conversation_id, message).await)
    }
}
