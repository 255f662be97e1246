// File: wainbox-common/src/models/mod.rs
pub mod message;
pub mod conversation;

pub use message::{
    Direction, Message, MessageStatus, MessageType, MetadataValue, ProcessingTimes,
    ProviderMetadata, Sender, StatusChange,
};
pub use conversation::ConversationSummary;
