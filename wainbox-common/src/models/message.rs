// File: wainbox-common/src/models/message.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of a message. Transitions are not checked for order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Unknown message status: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            _ => Err(format!("Unknown message direction: {}", s)),
        }
    }
}

/// Content kinds we accept from the provider.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contacts,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::Contacts => "contacts",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MessageType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "video" => Ok(MessageType::Video),
            "audio" => Ok(MessageType::Audio),
            "document" => Ok(MessageType::Document),
            "sticker" => Ok(MessageType::Sticker),
            "location" => Ok(MessageType::Location),
            "contacts" => Ok(MessageType::Contacts),
            _ => Err(format!("Unsupported message type: {}", s)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub number: String,
}

/// A primitive value inside the passthrough metadata map.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

/// Unstructured provider fields (display phone number, phone number id,
/// messaging product). Kept as-is for multi-number deployments.
pub type ProviderMetadata = BTreeMap<String, MetadataValue>;

/// Times recorded by the webhook relay, plus the last time a status update
/// touched the record.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingTimes {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub external_id: String,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender: Sender,
    pub provider_metadata: Option<ProviderMetadata>,

    pub gs_app_id: Option<String>,
    pub payload_id: Option<String>,
    pub processing_times: ProcessingTimes,
    pub executed: Option<bool>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A message typed by the operator in the UI. The external id is local
    /// since nothing was sent to the provider yet.
    pub fn outbound(conversation_id: &str, text: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            external_id: format!("web-{}", Uuid::new_v4()),
            text: Some(text.to_string()),
            timestamp: now,
            status: MessageStatus::Sent,
            direction: Direction::Outbound,
            message_type: MessageType::Text,
            sender: Sender {
                name: Some("You".to_string()),
                number: conversation_id.to_string(),
            },
            provider_metadata: None,
            gs_app_id: None,
            payload_id: None,
            processing_times: ProcessingTimes::default(),
            executed: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the fields the store treats as required.
    pub fn validate(&self) -> Result<(), String> {
        if self.conversation_id.trim().is_empty() {
            return Err("conversation_id is required".to_string());
        }
        if self.external_id.trim().is_empty() {
            return Err("external_id is required".to_string());
        }
        if self.sender.number.trim().is_empty() {
            return Err("sender.number is required".to_string());
        }
        Ok(())
    }
}

/// The fields a delivery-status update may touch.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: MessageStatus,
    pub timestamp: Option<DateTime<Utc>>,
    pub reconciled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_defaults() {
        let msg = Message::outbound("91999", "hello there");
        assert_eq!(msg.status, MessageStatus::Sent);
        assert_eq!(msg.direction, Direction::Outbound);
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.sender.name.as_deref(), Some("You"));
        assert_eq!(msg.sender.number, "91999");
        assert!(msg.external_id.starts_with("web-"));
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_sender_number() {
        let mut msg = Message::outbound("91999", "hi");
        msg.sender.number = String::new();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("READ".parse::<MessageStatus>(), Ok(MessageStatus::Read));
        assert_eq!("sticker".parse::<MessageType>(), Ok(MessageType::Sticker));
        assert!("reaction".parse::<MessageType>().is_err());
        assert_eq!(Direction::Inbound.to_string(), "inbound");
    }

    #[test]
    fn test_serializes_with_camel_case_and_type_key() {
        let msg = Message::outbound("91999", "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "91999");
        assert_eq!(json["type"], "text");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["direction"], "outbound");
    }
}
