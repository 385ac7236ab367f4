use std::{collections::HashMap, sync::RwLock};

use crate::{Error, Result};

/// Reply endpoint issued with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionWebhookEntry {
    pub url: String,
    /// Epoch millis after which the URL must not be used.
    pub expires_at: i64,
}

/// Latest session webhook per conversation.
///
/// Entries are overwritten on every inbound event and only evicted when a
/// read finds them expired; nothing sweeps in the background.
#[derive(Debug, Default)]
pub struct SessionWebhookCache {
    entries: RwLock<HashMap<String, SessionWebhookEntry>>,
}

impl SessionWebhookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the webhook for a conversation, replacing any previous one.
    pub fn put(&self, conversation_id: &str, url: &str, expires_at: i64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(conversation_id.to_string(), SessionWebhookEntry {
            url: url.to_string(),
            expires_at,
        });
    }

    pub fn get(&self, conversation_id: &str) -> Option<SessionWebhookEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(conversation_id).cloned()
    }

    /// Return the URL if still valid at `now` (epoch millis). An expired
    /// entry is evicted. Valid entries stay cached for reuse.
    pub fn take_valid(&self, conversation_id: &str, now: i64) -> Result<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(conversation_id) else {
            return Err(Error::WebhookUnknown {
                conversation_id: conversation_id.to_string(),
            });
        };
        if entry.expires_at <= now {
            entries.remove(conversation_id);
            return Err(Error::WebhookExpired {
                conversation_id: conversation_id.to_string(),
            });
        }
        Ok(entry.url.clone())
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
