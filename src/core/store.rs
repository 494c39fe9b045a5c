//! Conversation history store
//!
//! The whole collection is read, modified and written back on every change.
//! Storage faults never reach the caller: they are logged and reported as
//! `None`, `false` or an empty list so a chat session keeps working.

use chrono::Utc;
use std::sync::Arc;

use crate::conversation::{ConversationRecord, Message};

use super::storage::{KeyValueStorage, StorageError};

/// Storage key holding the serialized collection
pub const STORAGE_KEY: &str = "duskwave_chat_history";

/// Default number of conversations kept
pub const DEFAULT_MAX_CONVERSATIONS: usize = 50;

/// Bounded, most-recently-updated-first collection of conversations
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStorage>,
    max_conversations: usize,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, max_conversations: usize) -> Self {
        Self {
            storage,
            max_conversations: max_conversations.max(1),
        }
    }

    /// Save a new conversation, returning its id
    pub async fn create(
        &self,
        title: &str,
        persona_id: &str,
        messages: Vec<Message>,
    ) -> Option<String> {
        let record = ConversationRecord::new(title, persona_id, messages);
        let id = record.id.clone();

        let mut records = self.load_or_empty().await;
        records.insert(0, record);

        match self.save(records).await {
            Ok(()) => {
                tracing::debug!(%id, "Conversation created");
                Some(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Error saving chat history");
                None
            }
        }
    }

    /// Look up one conversation
    pub async fn get(&self, id: &str) -> Option<ConversationRecord> {
        self.list().await.into_iter().find(|r| r.id == id)
    }

    /// All conversations, most recently updated first
    pub async fn list(&self) -> Vec<ConversationRecord> {
        let mut records = self.load_or_empty().await;
        sort_recent_first(&mut records);
        records
    }

    /// Replace a conversation's contents; false when the id is unknown
    pub async fn update(
        &self,
        id: &str,
        title: &str,
        persona_id: &str,
        messages: Vec<Message>,
    ) -> bool {
        let mut records = match self.load().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Error updating chat history");
                return false;
            }
        };

        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return false;
        };

        record.title = title.to_string();
        record.persona_id = persona_id.to_string();
        record.messages = messages;
        record.updated_at = Utc::now();

        match self.save(records).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%id, error = %e, "Error updating chat history");
                false
            }
        }
    }

    /// Remove a conversation; false when the id is unknown
    pub async fn delete(&self, id: &str) -> bool {
        let mut records = match self.load().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Error deleting chat history");
                return false;
            }
        };

        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return false;
        }

        match self.save(records).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%id, error = %e, "Error deleting chat history");
                false
            }
        }
    }

    async fn load(&self) -> Result<Vec<ConversationRecord>, StorageError> {
        match self.storage.get_item(STORAGE_KEY).await? {
            Some(stored) if !stored.trim().is_empty() => Ok(serde_json::from_str(&stored)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn load_or_empty(&self) -> Vec<ConversationRecord> {
        self.load().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Error getting chat history");
            Vec::new()
        })
    }

    /// Order, cap and persist the collection
    async fn save(&self, mut records: Vec<ConversationRecord>) -> Result<(), StorageError> {
        sort_recent_first(&mut records);
        records.truncate(self.max_conversations);

        let payload = serde_json::to_string(&records)?;
        self.storage.set_item(STORAGE_KEY, &payload).await
    }
}

/// Stable sort, so equal timestamps keep their current order
fn sort_recent_first(records: &mut [ConversationRecord]) {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}
