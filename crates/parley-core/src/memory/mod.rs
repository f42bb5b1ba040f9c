//! Per-conversation history storage.
//!
//! Histories are append-only sequences of `Message`s keyed by
//! `ConversationId`. The store owns them; readers get owned copies. The
//! `context` submodule turns a stored history into the bounded window of chat
//! messages sent to the model.

pub mod context;
pub mod store;

use async_trait::async_trait;

use crate::conversation::ConversationId;
use crate::core_types::{Message, ToolOutput};
use crate::errors::AgentError;

pub use context::{context_window, to_chat_messages};
pub use store::InMemoryConversationStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Owned copy of the history; empty for an unknown id.
    async fn get(&self, id: &ConversationId) -> Vec<Message>;
    async fn append(&self, id: &ConversationId, message: Message) -> Result<(), AgentError>;
    /// Append a batch as one step: readers see all of it or none of it.
    async fn extend(&self, id: &ConversationId, messages: Vec<Message>) -> Result<(), AgentError>;
    async fn clear(&self, id: &ConversationId);
    /// Number of conversations currently held.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn stats(&self, id: &ConversationId) -> MemoryStats {
        MemoryStats::from_history(&self.get(id).await)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub message_count: usize,
    pub user_messages: usize,
    pub actions: usize,
    pub observations: usize,
    pub failed_observations: usize,
    pub final_answers: usize,
}

impl MemoryStats {
    pub fn from_history(history: &[Message]) -> Self {
        let mut stats = MemoryStats {
            message_count: history.len(),
            ..Default::default()
        };
        for message in history {
            match message {
                Message::UserMessage { .. } => stats.user_messages += 1,
                Message::AgentAction { .. } => stats.actions += 1,
                Message::ToolObservation { output, .. } => {
                    stats.observations += 1;
                    if let ToolOutput::Failure { .. } = output {
                        stats.failed_observations += 1;
                    }
                }
                Message::FinalAnswer { .. } => stats.final_answers += 1,
            }
        }
        stats
    }
}
