// src/repositories/mod.rs

pub use wainbox_common::traits::repository_traits::MessageRepository;

pub use postgres::PostgresMessageRepository;
pub use memory::InMemoryMessageRepository;

pub mod postgres;
pub mod memory;
