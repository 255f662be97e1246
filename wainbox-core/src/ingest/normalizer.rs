//! src/ingest/normalizer.rs
//!
//! Maps provider messages of a `WebhookBatch` onto `Message` records and
//! inserts them. A duplicate `external_id` or a bad message only affects
//! that one message; the rest of the batch continues.

use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn, error};
use uuid::Uuid;

use wainbox_common::models::{
    Direction, Message, MessageStatus, MessageType, ProcessingTimes, ProviderMetadata, Sender,
};
use wainbox_common::traits::repository_traits::MessageRepository;

use crate::eventbus::{ChatEvent, EventBus};
use crate::ingest::payload::{
    raw_id, ChangeValue, ProviderMessage, ProviderStatus, StatusUpdate, WebhookBatch, WebhookContact,
};
use crate::ingest::reconciler::{StatusOutcome, StatusReconciler};
use crate::utils::time::normalize_timestamp;
use crate::Error;

const UNKNOWN_CONTACT: &str = "Unknown";
const DEFAULT_MESSAGING_PRODUCT: &str = "whatsapp";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Inserted { external_id: String },
    Duplicate { external_id: String },
    Failed { external_id: String, reason: String },
}

impl MessageOutcome {
    pub fn external_id(&self) -> &str {
        match self {
            MessageOutcome::Inserted { external_id }
            | MessageOutcome::Duplicate { external_id }
            | MessageOutcome::Failed { external_id, .. } => external_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub messages: Vec<MessageOutcome>,
    pub statuses: Vec<StatusOutcome>,
}

/// Display name and number of whoever sent `msg`. Falls back to a
/// placeholder contact when the batch did not list the sender.
pub fn resolve_sender(msg: &ProviderMessage, contacts: &[WebhookContact]) -> Sender {
    match contacts.iter().find(|c| c.wa_id == msg.from) {
        Some(contact) => {
            let name = contact
                .profile
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(UNKNOWN_CONTACT);
            Sender {
                name: Some(name.to_string()),
                number: contact.wa_id.clone(),
            }
        }
        None => Sender {
            name: Some(UNKNOWN_CONTACT.to_string()),
            number: msg.from.clone(),
        },
    }
}

/// The text body, or `"[<type> message]"` when there is none.
pub fn message_text(msg: &ProviderMessage) -> String {
    msg.text
        .as_ref()
        .and_then(|t| t.body.as_deref())
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("[{} message]", msg.kind))
}

fn provider_metadata(change: &ChangeValue) -> ProviderMetadata {
    let mut meta = ProviderMetadata::new();
    if let Some(pm) = &change.metadata {
        if let Some(display) = &pm.display_phone_number {
            meta.insert("display_phone_number".to_string(), display.as_str().into());
        }
        if let Some(phone_id) = &pm.phone_number_id {
            meta.insert("phone_number_id".to_string(), phone_id.as_str().into());
        }
    }
    let product = change
        .messaging_product
        .as_deref()
        .unwrap_or(DEFAULT_MESSAGING_PRODUCT);
    meta.insert("messaging_product".to_string(), product.into());
    meta
}

/// Build the inbound record for one provider message. Pure; no I/O.
pub fn normalize_message(
    batch: &WebhookBatch,
    change: &ChangeValue,
    msg: &ProviderMessage,
) -> Result<Message, Error> {
    let message_type: MessageType = msg.kind.parse().map_err(Error::Validation)?;
    let timestamp = normalize_timestamp(&msg.timestamp).ok_or_else(|| {
        Error::Validation(format!("unparsable timestamp {} on message {}", msg.timestamp, msg.id))
    })?;

    let now = Utc::now();
    let record = Message {
        id: Uuid::new_v4(),
        conversation_id: msg.from.clone(),
        external_id: msg.id.clone(),
        text: Some(message_text(msg)),
        timestamp,
        // inbound messages have reached us, so they count as delivered
        status: MessageStatus::Delivered,
        direction: Direction::Inbound,
        message_type,
        sender: resolve_sender(msg, &change.contacts),
        provider_metadata: Some(provider_metadata(change)),
        gs_app_id: batch.gs_app_id.clone(),
        payload_id: batch.payload_id.clone(),
        processing_times: ProcessingTimes {
            created_at: batch.created_at,
            started_at: batch.started_at,
            completed_at: batch.completed_at,
            reconciled_at: None,
        },
        executed: batch.executed,
        created_at: now,
        updated_at: now,
    };
    record.validate().map_err(Error::Validation)?;
    Ok(record)
}

#[derive(Clone)]
pub struct MessageNormalizer {
    repo: Arc<dyn MessageRepository>,
    event_bus: Arc<EventBus>,
    reconciler: StatusReconciler,
}

impl MessageNormalizer {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        event_bus: Arc<EventBus>,
        reconciler: StatusReconciler,
    ) -> Self {
        Self { repo, event_bus, reconciler }
    }

    /// Normalize and insert every message of `batch`, then apply any receipts
    /// that rode along in the same changes.
    ///
    /// Only a fatal store error is returned as `Err`; everything else ends up
    /// in the outcome list.
    pub async fn ingest(&self, batch: &WebhookBatch, source_label: &str) -> Result<BatchOutcome, Error> {
        let mut outcome = BatchOutcome::default();
        if batch.is_empty() {
            info!("No messages found in payload {}", source_label);
            return Ok(outcome);
        }

        for change in batch.changes.iter() {
            for raw in change.messages.iter() {
                let result = match ProviderMessage::from_value(raw) {
                    Ok(msg) => self.ingest_one(batch, change, &msg).await?,
                    Err(e) => {
                        let external_id = raw_id(raw);
                        warn!("Skipping undecodable message {:?} in {}: {}", external_id, source_label, e);
                        MessageOutcome::Failed { external_id, reason: e.to_string() }
                    }
                };
                outcome.messages.push(result);
            }
            for raw in change.statuses.iter() {
                let result = match ProviderStatus::from_value(raw) {
                    Ok(receipt) => self.reconciler.reconcile_outcome(&StatusUpdate::from(&receipt)).await?,
                    Err(e) => {
                        let message_id = raw_id(raw);
                        warn!("Skipping undecodable receipt {:?} in {}: {}", message_id, source_label, e);
                        StatusOutcome::Failed { message_id, reason: e.to_string() }
                    }
                };
                outcome.statuses.push(result);
            }
        }

        debug!(
            "Batch {} => {} message(s), {} receipt(s)",
            source_label,
            outcome.messages.len(),
            outcome.statuses.len()
        );
        Ok(outcome)
    }

    async fn ingest_one(
        &self,
        batch: &WebhookBatch,
        change: &ChangeValue,
        msg: &ProviderMessage,
    ) -> Result<MessageOutcome, Error> {
        let external_id = msg.id.clone();
        let record = match normalize_message(batch, change, msg) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping message {}: {}", external_id, e);
                return Ok(MessageOutcome::Failed { external_id, reason: e.to_string() });
            }
        };

        match self.repo.insert(&record).await {
            Ok(saved) => {
                info!(
                    "Message {} processed for {}",
                    saved.external_id,
                    saved.sender.name.as_deref().unwrap_or(&saved.sender.number)
                );
                self.event_bus.publish(ChatEvent::NewMessage(saved)).await;
                Ok(MessageOutcome::Inserted { external_id })
            }
            Err(Error::DuplicateKey(_)) => {
                warn!("Message {} already stored; skipping duplicate", external_id);
                Ok(MessageOutcome::Duplicate { external_id })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Failed to store message {}: {}", external_id, e);
                Ok(MessageOutcome::Failed { external_id, reason: e.to_string() })
            }
        }
    }
}
