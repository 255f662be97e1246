//! src/ingest/reconciler.rs
//!
//! Applies delivery receipts to stored messages. Only `status`, `timestamp`
//! and the reconciled marker are ever written.

use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use wainbox_common::models::{Message, MessageStatus, StatusChange};
use wainbox_common::traits::repository_traits::MessageRepository;

use crate::eventbus::{ChatEvent, EventBus};
use crate::ingest::payload::{is_truthy, StatusUpdate};
use crate::utils::time::normalize_timestamp;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied(Message),
    NotFound,
}

/// Summary of one receipt, as reported by the ingestion driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusOutcome {
    Applied { message_id: String, status: MessageStatus },
    NotFound { message_id: String },
    Failed { message_id: String, reason: String },
}

/// Turn a receipt into the fields to write. Out-of-order transitions
/// (read -> delivered) are accepted as plain overwrites.
pub fn status_change(update: &StatusUpdate) -> Result<StatusChange, Error> {
    let status: MessageStatus = update.status.parse().map_err(Error::Validation)?;
    // an empty, zero or blank timestamp means "not given"
    let timestamp = match update.timestamp.as_ref() {
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(raw) if is_truthy(Some(raw)) => Some(normalize_timestamp(raw).ok_or_else(|| {
            Error::Validation(format!(
                "unparsable timestamp {} on status update for {}",
                raw, update.message_id
            ))
        })?),
        _ => None,
    };
    Ok(StatusChange {
        status,
        timestamp,
        reconciled_at: Utc::now(),
    })
}

#[derive(Clone)]
pub struct StatusReconciler {
    repo: Arc<dyn MessageRepository>,
    event_bus: Arc<EventBus>,
}

impl StatusReconciler {
    pub fn new(repo: Arc<dyn MessageRepository>, event_bus: Arc<EventBus>) -> Self {
        Self { repo, event_bus }
    }

    pub async fn reconcile(&self, update: &StatusUpdate) -> Result<ReconcileOutcome, Error> {
        let change = status_change(update)?;
        match self.repo.apply_status(&update.message_id, &change).await? {
            Some(updated) => {
                info!("Status updated to {} for message {}", change.status, update.message_id);
                self.event_bus.publish(ChatEvent::StatusUpdate(updated.clone())).await;
                Ok(ReconcileOutcome::Applied(updated))
            }
            None => {
                warn!("Message not found for status update: {}", update.message_id);
                Ok(ReconcileOutcome::NotFound)
            }
        }
    }

    /// Like `reconcile`, but folds every non-fatal error into the outcome.
    pub async fn reconcile_outcome(&self, update: &StatusUpdate) -> Result<StatusOutcome, Error> {
        let message_id = update.message_id.clone();
        match self.reconcile(update).await {
            Ok(ReconcileOutcome::Applied(m)) => Ok(StatusOutcome::Applied { message_id, status: m.status }),
            Ok(ReconcileOutcome::NotFound) => Ok(StatusOutcome::NotFound { message_id }),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Failed to apply status update for {}: {}", message_id, e);
                Ok(StatusOutcome::Failed { message_id, reason: e.to_string() })
            }
        }
    }
}
