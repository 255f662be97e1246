//! src/ingest/driver.rs
//!
//! Runs a list of payload sources through classification, normalization and
//! status reconciliation, one source at a time.

use std::sync::Arc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use wainbox_common::traits::repository_traits::MessageRepository;

use crate::eventbus::{ChatEvent, EventBus};
use crate::ingest::normalizer::{MessageNormalizer, MessageOutcome};
use crate::ingest::payload::Payload;
use crate::ingest::reconciler::{StatusOutcome, StatusReconciler};
use crate::ingest::source::PayloadSource;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceOutcome {
    Messages {
        messages: Vec<MessageOutcome>,
        statuses: Vec<StatusOutcome>,
    },
    Status { status: StatusOutcome },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub label: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            SourceOutcome::Messages { .. } | SourceOutcome::Status { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.sources.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::Skipped { .. }))
            .count()
    }

    pub fn inserted(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match &s.outcome {
                SourceOutcome::Messages { messages, .. } => messages
                    .iter()
                    .filter(|m| matches!(m, MessageOutcome::Inserted { .. }))
                    .count(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Clone)]
pub struct IngestionDriver {
    normalizer: MessageNormalizer,
    reconciler: StatusReconciler,
    event_bus: Arc<EventBus>,
}

impl IngestionDriver {
    pub fn new(repo: Arc<dyn MessageRepository>, event_bus: Arc<EventBus>) -> Self {
        let reconciler = StatusReconciler::new(repo.clone(), event_bus.clone());
        let normalizer = MessageNormalizer::new(repo, event_bus.clone(), reconciler.clone());
        Self {
            normalizer,
            reconciler,
            event_bus,
        }
    }

    /// Dispatch one already-parsed document.
    pub async fn process_value(&self, label: &str, raw: Value) -> Result<SourceOutcome, Error> {
        match Payload::decode(raw)? {
            Payload::NewMessageBatch(batch) => {
                debug!("{}: new-message batch with {} message(s)", label, batch.message_count());
                let outcome = self.normalizer.ingest(&batch, label).await?;
                Ok(SourceOutcome::Messages {
                    messages: outcome.messages,
                    statuses: outcome.statuses,
                })
            }
            Payload::StatusUpdate(update) => {
                debug!("{}: status update for {}", label, update.message_id);
                let status = self.reconciler.reconcile_outcome(&update).await?;
                Ok(SourceOutcome::Status { status })
            }
            Payload::Unrecognized => {
                warn!("Unknown payload type in {}", label);
                Ok(SourceOutcome::Skipped {
                    reason: "unrecognized payload".to_string(),
                })
            }
        }
    }

    /// Read, parse and dispatch one source. Non-fatal errors are folded
    /// into `SourceOutcome::Failed`.
    pub async fn process_source(&self, source: &dyn PayloadSource) -> Result<SourceReport, Error> {
        let label = source.label().to_string();
        let result = match source.read().await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(raw) => self.process_value(&label, raw).await,
                Err(e) => Err(Error::MalformedPayload(e.to_string())),
            },
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => {
                error!("Aborting ingestion at {}: {}", label, e);
                return Err(e);
            }
            Err(e) => {
                error!("Error processing {}: {}", label, e);
                SourceOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        Ok(SourceReport { label, outcome })
    }

    /// Process every source in order. Only a fatal store error stops the run;
    /// records persisted before it stay.
    pub async fn run(&self, sources: &[Box<dyn PayloadSource>]) -> Result<RunReport, Error> {
        let mut report = RunReport::default();
        for source in sources {
            info!("Processing {}", source.label());
            report.sources.push(self.process_source(source.as_ref()).await?);
        }

        info!(
            "All payloads processed: {} ok, {} skipped, {} failed, {} message(s) inserted",
            report.succeeded(),
            report.skipped(),
            report.failed(),
            report.inserted()
        );
        self.event_bus
            .publish(ChatEvent::SystemMessage(format!(
                "ingestion finished for {} source(s)",
                report.sources.len()
            )))
            .await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::InlineSource;
    use crate::repositories::InMemoryMessageRepository;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use wainbox_common::models::{ConversationSummary, Message, MessageStatus, StatusChange};

    mock! {
        pub Store {}

        #[async_trait]
        impl MessageRepository for Store {
            async fn insert(&self, message: &Message) -> Result<Message, Error>;
            async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, Error>;
            async fn apply_status(&self, external_id: &str, change: &StatusChange) -> Result<Option<Message>, Error>;
            async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, Error>;
            async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error>;
        }
    }

    fn text_webhook(wamid: &str, from: &str, body: &str) -> Value {
        json!({
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "contacts": [{"profile": {"name": "Ravi"}, "wa_id": from}],
                        "messages": [{
                            "from": from, "id": wamid, "timestamp": "1700000000",
                            "type": "text", "text": {"body": body}
                        }]
                    }
                }]
            }]
        })
    }

    fn inline(label: &str, v: &Value) -> Box<dyn PayloadSource> {
        Box::new(InlineSource::new(label, v.to_string()))
    }

    #[tokio::test]
    async fn test_malformed_middle_source_does_not_stop_run() -> Result<(), Error> {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let driver = IngestionDriver::new(repo.clone(), Arc::new(EventBus::new()));

        let sources: Vec<Box<dyn PayloadSource>> = vec![
            inline("1.json", &text_webhook("wamid.A", "91999", "one")),
            Box::new(InlineSource::new("2.json", "{ not json")),
            inline("3.json", &text_webhook("wamid.B", "91999", "three")),
        ];
        let report = driver.run(&sources).await?;

        assert_eq!(report.sources.len(), 3);
        assert!(matches!(report.sources[1].outcome, SourceOutcome::Failed { .. }));
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.inserted(), 2);
        assert_eq!(repo.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unrecognized_payload_is_skipped() -> Result<(), Error> {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let driver = IngestionDriver::new(repo.clone(), Arc::new(EventBus::new()));

        let report = driver
            .process_source(&InlineSource::new("odd.json", r#"{"hello": "world"}"#))
            .await?;
        assert!(matches!(report.outcome, SourceOutcome::Skipped { .. }));
        assert!(repo.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_store_unavailable_aborts_run() {
        let mut store = MockStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(Error::StoreUnavailable("pool timed out".into())));
        let driver = IngestionDriver::new(Arc::new(store), Arc::new(EventBus::new()));

        let sources: Vec<Box<dyn PayloadSource>> = vec![
            inline("1.json", &text_webhook("wamid.A", "91999", "one")),
            inline("2.json", &text_webhook("wamid.B", "91999", "two")),
        ];
        let result = driver.run(&sources).await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_non_fatal_store_error_is_reported() -> Result<(), Error> {
        let mut store = MockStore::new();
        store
            .expect_apply_status()
            .returning(|_, _| Err(Error::Database(sqlx::Error::RowNotFound)));
        let driver = IngestionDriver::new(Arc::new(store), Arc::new(EventBus::new()));

        let receipt = json!({"message_id": "wamid.1", "status": "read"});
        let outcome = driver.process_value("receipt.json", receipt).await?;
        assert!(matches!(
            outcome,
            SourceOutcome::Status { status: StatusOutcome::Failed { .. } }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_status_source_reports_applied() -> Result<(), Error> {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let driver = IngestionDriver::new(repo.clone(), Arc::new(EventBus::new()));
        driver
            .process_value("msg.json", text_webhook("wamid.1", "91999", "hi"))
            .await?;

        let outcome = driver
            .process_value("receipt.json", json!({"message_id": "wamid.1", "status": "read"}))
            .await?;
        assert_eq!(
            outcome,
            SourceOutcome::Status {
                status: StatusOutcome::Applied {
                    message_id: "wamid.1".into(),
                    status: MessageStatus::Read
                }
            }
        );
        Ok(())
    }

    #[test]
    fn test_report_serializes_with_kind_tag() {
        let report = SourceReport {
            label: "2.json".into(),
            outcome: SourceOutcome::Failed { reason: "bad".into() },
        };
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v, json!({"label": "2.json", "kind": "failed", "reason": "bad"}));
    }
}
