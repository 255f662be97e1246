// File: src/services/mod.rs

pub mod message_service;

pub use message_service::MessageService;
