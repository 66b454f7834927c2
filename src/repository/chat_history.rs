use super::store::Store;
use super::Repository;
use crate::entity::ChatHistory;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Latest state of one conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_message: String,
    pub last_response: String,
    pub last_date: DateTime<Utc>,
    pub message_count: usize,
}

pub struct ChatHistoryRepository {
    store: Arc<Store>,
}

impl ChatHistoryRepository {
    pub fn new(store: Arc<Store>) -> Self {
        ChatHistoryRepository { store }
    }

    /// Exchanges of a conversation, oldest first
    pub async fn find_by_conversation_id(&self, conversation_id: &str) -> Result<Vec<ChatHistory>> {
        let mut entries: Vec<ChatHistory> = self
            .store
            .read(|c| {
                c.chat_history
                    .iter()
                    .filter(|h| h.conversation_id == conversation_id)
                    .cloned()
                    .collect()
            })
            .await;
        entries.sort_by(|a, b| a.date.cmp(&b.date));

        Ok(entries)
    }

    /// Remove a whole conversation; true if it had any entries
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.store
            .write(|c| {
                let before = c.chat_history.len();
                c.chat_history.retain(|h| h.conversation_id != conversation_id);
                c.chat_history.len() != before
            })
            .await
    }

    /// Most recently active conversations
    pub async fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .store
            .read(|c| {
                let mut groups: HashMap<&str, ConversationSummary> = HashMap::new();
                for entry in &c.chat_history {
                    let summary = groups
                        .entry(entry.conversation_id.as_str())
                        .or_insert_with(|| ConversationSummary {
                            conversation_id: entry.conversation_id.clone(),
                            last_message: entry.prompt.clone(),
                            last_response: entry.response.clone(),
                            last_date: entry.date,
                            message_count: 0,
                        });
                    summary.message_count += 1;
                    if entry.date >= summary.last_date {
                        summary.last_message = entry.prompt.clone();
                        summary.last_response = entry.response.clone();
                        summary.last_date = entry.date;
                    }
                }
                groups.into_values().collect()
            })
            .await;

        summaries.sort_by(|a, b| {
            b.last_date
                .cmp(&a.last_date)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        summaries.truncate(limit);

        Ok(summaries)
    }
}

impl Repository for ChatHistoryRepository {
    type Entity = ChatHistory;

    async fn find_by_id(&self, id: &str) -> Result<Option<ChatHistory>> {
        Ok(self
            .store
            .read(|c| c.chat_history.iter().find(|h| h.id == id).cloned())
            .await)
    }

    async fn save(&self, entity: ChatHistory) -> Result<String> {
        let id = entity.id.clone();
        let inserted = self
            .store
            .write(|c| {
                if c.chat_history.iter().any(|h| h.id == entity.id) {
                    return false;
                }
                c.chat_history.push(entity);
                true
            })
            .await?;

        if !inserted {
            return Err(anyhow!("Chat history entry {} already exists", id));
        }
        Ok(id)
    }

    async fn update<F>(&self, id: &str, change: F) -> Result<bool>
    where
        F: FnOnce(&mut ChatHistory),
    {
        self.store
            .write(|c| match c.chat_history.iter_mut().find(|h| h.id == id) {
                Some(entry) => {
                    change(entry);
                    true
                }
                None => false,
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.store
            .write(|c| {
                let before = c.chat_history.len();
                c.chat_history.retain(|h| h.id != id);
                c.chat_history.len() != before
            })
            .await
    }

    /// Newest first
    async fn find_all(&self) -> Result<Vec<ChatHistory>> {
        let mut entries = self.store.read(|c| c.chat_history.clone()).await;
        entries.sort_by(|a, b| b.date.cmp(&a.date));

        Ok(entries)
    }
}
