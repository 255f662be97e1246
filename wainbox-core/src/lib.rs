// src/lib.rs

pub mod db;
pub mod repositories;
pub mod eventbus;
pub mod ingest;
pub mod services;
pub mod api;
pub mod utils;
pub mod test_utils;

pub use db::Database;
pub use wainbox_common::error::Error;
