// src/repositories/postgres/mod.rs

pub mod message;

pub use message::PostgresMessageRepository;
