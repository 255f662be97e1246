// src/repositories/memory/message.rs
//
// DashMap-backed message store. Used by `--store memory` and by tests.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use wainbox_common::models::{ConversationSummary, Message, StatusChange};
use wainbox_common::traits::repository_traits::MessageRepository;
use crate::Error;

#[derive(Default)]
pub struct InMemoryMessageRepository {
    by_external_id: DashMap<String, Message>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_external_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external_id.is_empty()
    }

    fn sorted_ascending(mut messages: Vec<Message>) -> Vec<Message> {
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        messages
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &Message) -> Result<Message, Error> {
        message.validate().map_err(Error::Validation)?;

        match self.by_external_id.entry(message.external_id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateKey(message.external_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(message.clone());
                Ok(message.clone())
            }
        }
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, Error> {
        Ok(self.by_external_id.get(external_id).map(|m| m.value().clone()))
    }

    async fn apply_status(
        &self,
        external_id: &str,
        change: &StatusChange,
    ) -> Result<Option<Message>, Error> {
        let Some(mut entry) = self.by_external_id.get_mut(external_id) else {
            return Ok(None);
        };
        let msg = entry.value_mut();
        msg.status = change.status;
        if let Some(ts) = change.timestamp {
            msg.timestamp = ts;
        }
        msg.processing_times.reconciled_at = Some(change.reconciled_at);
        msg.updated_at = Utc::now();
        Ok(Some(msg.clone()))
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, Error> {
        let matching = self
            .by_external_id
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.value().clone())
            .collect();
        Ok(Self::sorted_ascending(matching))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error> {
        let mut grouped: HashMap<String, Vec<Message>> = HashMap::new();
        for m in self.by_external_id.iter() {
            grouped
                .entry(m.conversation_id.clone())
                .or_default()
                .push(m.value().clone());
        }

        let mut summaries: Vec<ConversationSummary> = grouped
            .into_iter()
            .filter_map(|(conversation_id, messages)| {
                let messages = Self::sorted_ascending(messages);
                let sender = messages.first()?.sender.clone();
                let message_count = messages.len() as i64;
                let last_message = messages.last()?.clone();
                Some(ConversationSummary {
                    conversation_id,
                    last_message,
                    sender,
                    message_count,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.last_message.timestamp.cmp(&a.last_message.timestamp));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use wainbox_common::models::MessageStatus;

    fn msg_at(conversation: &str, external_id: &str, minutes_ago: i64) -> Message {
        let mut m = Message::outbound(conversation, "hi");
        m.external_id = external_id.to_string();
        m.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        m
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() -> Result<(), Error> {
        let repo = InMemoryMessageRepository::new();
        repo.insert(&msg_at("91999", "wamid.1", 5)).await?;

        let second = repo.insert(&msg_at("91999", "wamid.1", 1)).await;
        assert!(matches!(second, Err(Error::DuplicateKey(id)) if id == "wamid.1"));
        assert_eq!(repo.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_status_on_missing_id_changes_nothing() -> Result<(), Error> {
        let repo = InMemoryMessageRepository::new();
        repo.insert(&msg_at("91999", "wamid.1", 5)).await?;

        let change = StatusChange {
            status: MessageStatus::Read,
            timestamp: None,
            reconciled_at: Utc::now(),
        };
        assert!(repo.apply_status("wamid.404", &change).await?.is_none());

        let stored = repo.find_by_external_id("wamid.1").await?.unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
        assert!(stored.processing_times.reconciled_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_conversation_listing_and_ordering() -> Result<(), Error> {
        let repo = InMemoryMessageRepository::new();
        repo.insert(&msg_at("alice", "a-2", 10)).await?;
        repo.insert(&msg_at("alice", "a-1", 30)).await?;
        repo.insert(&msg_at("bob", "b-1", 1)).await?;

        let alice = repo.list_by_conversation("alice").await?;
        let ids: Vec<_> = alice.iter().map(|m| m.external_id.as_str()).collect();
        assert_eq!(ids, vec!["a-1", "a-2"]);

        let convs = repo.list_conversations().await?;
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].conversation_id, "bob");
        assert_eq!(convs[1].conversation_id, "alice");
        assert_eq!(convs[1].message_count, 2);
        assert_eq!(convs[1].last_message.external_id, "a-2");
        Ok(())
    }
}
