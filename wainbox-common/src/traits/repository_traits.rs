use async_trait::async_trait;
use crate::error::Error;
use crate::models::{ConversationSummary, Message, StatusChange};

/// Storage for messages, keyed by the provider-assigned `external_id`.
///
/// Implementations must reject a second insert with the same `external_id`
/// with `Error::DuplicateKey`; that constraint is the only idempotency
/// guarantee the ingestion pipeline relies on.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<Message, Error>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, Error>;

    /// Writes status, the optional new timestamp and the reconciled marker.
    /// Returns `None` when no message carries `external_id`.
    async fn apply_status(
        &self,
        external_id: &str,
        change: &StatusChange,
    ) -> Result<Option<Message>, Error>;

    /// Messages of one conversation, oldest first.
    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, Error>;

    /// One summary per conversation, most recently active first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error>;
}
