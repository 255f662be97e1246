// src/repositories/memory/mod.rs

pub mod message;

pub use message::InMemoryMessageRepository;
