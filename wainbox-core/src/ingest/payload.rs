//! src/ingest/payload.rs
//!
//! Wire shapes of WhatsApp webhook deliveries and the single classification
//! step that turns a decoded JSON document into a typed `Payload`.
//!
//! Two outer shapes are accepted for message batches:
//! - the bare Meta webhook (`{"object": ..., "entry": [...]}`)
//! - the same webhook wrapped by a BSP relay under `metaData`, next to the
//!   relay's `_id`, processing times and `executed` flag.
//!
//! Standalone receipts look like `{"message_id": ..., "status": ..., "timestamp": ...}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::utils::time::normalize_timestamp;
use crate::Error;

const MESSAGES_FIELD: &str = "messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    NewMessageBatch,
    StatusUpdate,
    Unrecognized,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub object: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub entry: Vec<WebhookEntry>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub gs_app_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default, deserialize_with = "lenient::string")]
    pub field: String,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub value: ChangeValue,
}

/// One `messages` change. Messages and receipts stay raw here and are
/// decoded one at a time, so a bad entry only fails itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub messaging_product: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub metadata: Option<PhoneMetadata>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub contacts: Vec<WebhookContact>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub messages: Vec<Value>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub statuses: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhoneMetadata {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub display_phone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookContact {
    #[serde(default, deserialize_with = "lenient::string")]
    pub wa_id: String,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactProfile {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub from: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    /// Epoch seconds, usually as a string.
    #[serde(default)]
    pub timestamp: Value,
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient::opt")]
    pub text: Option<TextBody>,
}

impl ProviderMessage {
    pub fn from_value(raw: &Value) -> Result<Self, Error> {
        serde_json::from_value(raw.clone()).map_err(malformed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextBody {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub body: Option<String>,
}

/// A receipt delivered inside a `messages` change (`value.statuses[]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderStatus {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub recipient_id: Option<String>,
}

impl ProviderStatus {
    pub fn from_value(raw: &Value) -> Result<Self, Error> {
        serde_json::from_value(raw.clone()).map_err(malformed)
    }
}

/// Best-effort id of a raw message or receipt, for reporting one that
/// failed to decode.
pub fn raw_id(raw: &Value) -> String {
    match raw.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// The outer document a BSP relay stores around the Meta webhook.
#[derive(Debug, Deserialize)]
struct RelayWrapper {
    #[serde(rename = "_id", default)]
    id: Option<Value>,
    #[serde(rename = "metaData")]
    meta_data: WebhookEnvelope,
    #[serde(rename = "createdAt", default)]
    created_at: Option<Value>,
    #[serde(rename = "startedAt", default)]
    started_at: Option<Value>,
    #[serde(rename = "completedAt", default)]
    completed_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient::opt")]
    executed: Option<bool>,
}

/// Field deserializers that never fail the enclosing document: a null or a
/// value of the wrong type becomes the field's empty value.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_string(d)?.unwrap_or_default())
    }

    /// Numbers are kept in their decimal form; phone numbers sometimes
    /// arrive unquoted.
    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn opt<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<T>, D::Error> {
        Ok(serde_json::from_value(Value::deserialize(d)?).ok())
    }

    pub fn or_default<'de, D: Deserializer<'de>, T: DeserializeOwned + Default>(d: D) -> Result<T, D::Error> {
        Ok(opt(d)?.unwrap_or_default())
    }

    /// Elements that do not decode as `T` are dropped.
    pub fn vec<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Vec<T>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

/// A decoded new-message delivery: every `messages` change of the webhook
/// plus the relay's batch-level diagnostics.
#[derive(Debug, Clone, Default)]
pub struct WebhookBatch {
    pub payload_id: Option<String>,
    pub gs_app_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub executed: Option<bool>,
    pub changes: Vec<ChangeValue>,
}

impl WebhookBatch {
    fn from_value(raw: Value) -> Result<Self, Error> {
        let wrapped = raw.get("metaData").is_some_and(Value::is_object);
        let mut batch = if wrapped {
            let w: RelayWrapper = serde_json::from_value(raw).map_err(malformed)?;
            WebhookBatch {
                payload_id: w.id.as_ref().and_then(id_string),
                gs_app_id: w.meta_data.gs_app_id.clone(),
                created_at: w.created_at.as_ref().and_then(normalize_timestamp),
                started_at: w.started_at.as_ref().and_then(normalize_timestamp),
                completed_at: w.completed_at.as_ref().and_then(normalize_timestamp),
                executed: w.executed,
                changes: message_changes(w.meta_data),
            }
        } else {
            let env: WebhookEnvelope = serde_json::from_value(raw).map_err(malformed)?;
            WebhookBatch {
                gs_app_id: env.gs_app_id.clone(),
                changes: message_changes(env),
                ..Default::default()
            }
        };
        batch.changes.retain(|c| !c.messages.is_empty() || !c.statuses.is_empty());
        Ok(batch)
    }

    pub fn message_count(&self) -> usize {
        self.changes.iter().map(|c| c.messages.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn message_changes(env: WebhookEnvelope) -> Vec<ChangeValue> {
    env.entry
        .into_iter()
        .flat_map(|e| e.changes)
        .filter(|c| c.field == MESSAGES_FIELD)
        .map(|c| c.value)
        .collect()
}

/// `_id` is either a plain string or a Mongo export `{"$oid": "..."}`.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn malformed(e: serde_json::Error) -> Error {
    Error::MalformedPayload(e.to_string())
}

/// A standalone delivery-status receipt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdate {
    pub message_id: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl From<&ProviderStatus> for StatusUpdate {
    fn from(s: &ProviderStatus) -> Self {
        Self {
            message_id: s.id.clone(),
            status: s.status.clone(),
            timestamp: s.timestamp.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    NewMessageBatch(WebhookBatch),
    StatusUpdate(StatusUpdate),
    Unrecognized,
}

impl Payload {
    /// Classify `raw` and decode it into its typed form. Nothing downstream
    /// looks at the raw JSON again.
    pub fn decode(raw: Value) -> Result<Self, Error> {
        match classify(&raw) {
            PayloadKind::NewMessageBatch => WebhookBatch::from_value(raw).map(Payload::NewMessageBatch),
            PayloadKind::StatusUpdate => serde_json::from_value::<StatusUpdate>(raw)
                .map(Payload::StatusUpdate)
                .map_err(malformed),
            PayloadKind::Unrecognized => Ok(Payload::Unrecognized),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::NewMessageBatch(_) => PayloadKind::NewMessageBatch,
            Payload::StatusUpdate(_) => PayloadKind::StatusUpdate,
            Payload::Unrecognized => PayloadKind::Unrecognized,
        }
    }
}

/// Structural classification: looks only at which fields are present.
pub fn classify(payload: &Value) -> PayloadKind {
    if first_change_field(payload) == Some(MESSAGES_FIELD) {
        PayloadKind::NewMessageBatch
    } else if is_truthy(payload.get("status")) && is_truthy(payload.get("message_id")) {
        PayloadKind::StatusUpdate
    } else {
        PayloadKind::Unrecognized
    }
}

fn first_change_field(payload: &Value) -> Option<&str> {
    let envelope = payload
        .get("metaData")
        .filter(|v| v.is_object())
        .unwrap_or(payload);
    envelope
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("field")?
        .as_str()
}

/// JSON truthiness: null, false, 0 and "" are all absent.
pub(crate) fn is_truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
