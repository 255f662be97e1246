use serde::{Deserialize, Serialize};
use crate::models::message::{Message, Sender};

/// One row of the conversation list: the newest message, who started the
/// conversation, and how many messages it holds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_message: Message,
    pub sender: Sender,
    pub message_count: i64,
}
