use std::sync::Arc;
use tracing::{debug, info};

use wainbox_common::models::{ConversationSummary, Message};
use wainbox_common::traits::repository_traits::MessageRepository;

use crate::eventbus::{ChatEvent, EventBus};
use crate::Error;

/// Read and outbound-write operations behind the HTTP API.
pub struct MessageService {
    repo: Arc<dyn MessageRepository>,
    event_bus: Arc<EventBus>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn MessageRepository>, event_bus: Arc<EventBus>) -> Self {
        debug!("MessageService::new() called");
        Self { repo, event_bus }
    }

    /// Stores an agent-authored message for `wa_id` and broadcasts it.
    /// The message is only recorded; nothing is sent to the provider.
    pub async fn create_outbound(&self, wa_id: &str, text: &str) -> Result<Message, Error> {
        let wa_id = wa_id.trim();
        if wa_id.is_empty() {
            return Err(Error::Validation("wa_id is required".into()));
        }
        if text.trim().is_empty() {
            return Err(Error::Validation("text is required".into()));
        }

        let saved = self.repo.insert(&Message::outbound(wa_id, text)).await?;
        info!("Outbound message {} stored for {}", saved.external_id, wa_id);
        self.event_bus.publish(ChatEvent::NewMessage(saved.clone())).await;
        Ok(saved)
    }

    pub async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>, Error> {
        self.repo.list_by_conversation(conversation_id).await
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, Error> {
        self.repo.list_conversations().await
    }
}
