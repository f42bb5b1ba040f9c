//! In-process conversation store.
//!
//! Whole conversations are evicted least-recently-written first once
//! `max_conversations` is reached. A history is never shortened in place.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ConversationStore;
use crate::conversation::ConversationId;
use crate::core_types::Message;
use crate::errors::AgentError;

struct Entry {
    messages: Vec<Message>,
    last_write: u64,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Entry>,
    clock: u64,
}

impl Inner {
    fn entry_for_write(&mut self, id: &ConversationId, max_conversations: usize) -> &mut Entry {
        self.clock += 1;
        let now = self.clock;

        if !self.conversations.contains_key(id)
            && max_conversations > 0
            && self.conversations.len() >= max_conversations
        {
            self.evict_oldest();
        }

        let entry = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| Entry {
                messages: Vec::new(),
                last_write: now,
            });
        entry.last_write = now;
        entry
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .conversations
            .iter()
            .min_by_key(|(_, entry)| entry.last_write)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            log::info!("Evicting conversation {} from memory", id);
            self.conversations.remove(&id);
        }
    }
}

pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
    max_conversations: usize,
}

impl InMemoryConversationStore {
    /// `max_conversations == 0` keeps every conversation.
    pub fn new(max_conversations: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_conversations,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub async fn contains(&self, id: &ConversationId) -> bool {
        self.inner.read().await.conversations.contains_key(id)
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, id: &ConversationId) -> Vec<Message> {
        self.inner
            .read()
            .await
            .conversations
            .get(id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default()
    }

    async fn append(&self, id: &ConversationId, message: Message) -> Result<(), AgentError> {
        let mut inner = self.inner.write().await;
        inner
            .entry_for_write(id, self.max_conversations)
            .messages
            .push(message);
        Ok(())
    }

    async fn extend(&self, id: &ConversationId, messages: Vec<Message>) -> Result<(), AgentError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        let entry = inner.entry_for_write(id, self.max_conversations);
        entry.messages.extend(messages);
        log::debug!("Conversation {} now holds {} entries", id, entry.messages.len());
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) {
        self.inner.write().await.conversations.remove(id);
    }

    async fn len(&self) -> usize {
        self.inner.read().await.conversations.len()
    }
}
