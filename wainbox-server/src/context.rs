//! wainbox-server/src/context.rs
//!
//! The bag of long-lived handles shared by both run modes.

use std::sync::Arc;
use tracing::info;

use wainbox_core::db::Database;
use wainbox_core::eventbus::EventBus;
use wainbox_core::repositories::{InMemoryMessageRepository, MessageRepository, PostgresMessageRepository};
use wainbox_core::Error;

use crate::{Args, StoreKind};

pub struct ServerContext {
    /// Only present with `--store postgres`.
    pub db: Option<Database>,
    pub repo: Arc<dyn MessageRepository>,
    pub event_bus: Arc<EventBus>,
}

impl ServerContext {
    pub async fn new(args: &Args) -> Result<Self, Error> {
        let (db, repo): (Option<Database>, Arc<dyn MessageRepository>) = match args.store {
            StoreKind::Postgres => {
                info!("Using Postgres store");
                let db = Database::new(&args.db_url, args.db_max_connections).await?;
                db.migrate().await?;
                let repo = Arc::new(PostgresMessageRepository::new(db.pool().clone()));
                (Some(db), repo)
            }
            StoreKind::Memory => {
                info!("Using in-memory store; nothing is persisted");
                (None, Arc::new(InMemoryMessageRepository::new()))
            }
        };

        Ok(Self {
            db,
            repo,
            event_bus: Arc::new(EventBus::new()),
        })
    }

    pub async fn shutdown(&self) {
        self.event_bus.shutdown();
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}
