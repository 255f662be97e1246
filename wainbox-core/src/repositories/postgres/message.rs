// src/repositories/postgres/message.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use wainbox_common::models::{
    ConversationSummary, Message, ProcessingTimes, ProviderMetadata, Sender,
    StatusChange,
};
use wainbox_common::traits::repository_traits::MessageRepository;
use crate::Error;

const MESSAGE_COLUMNS: &str = r#"
    id, conversation_id, external_id, text, timestamp, status, direction,
    message_type, sender_name, sender_number, provider_metadata,
    gs_app_id, payload_id, source_created_at, source_started_at,
    source_completed_at, reconciled_at, executed, created_at, updated_at
"#;

pub struct PostgresMessageRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresMessageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, Error> {
    raw.parse::<T>().map_err(Error::Parse)
}

fn row_to_message(r: &PgRow) -> Result<Message, Error> {
    let status: String = r.try_get("status")?;
    let direction: String = r.try_get("direction")?;
    let message_type: String = r.try_get("message_type")?;
    let provider_metadata = match r.try_get::<Option<Value>, _>("provider_metadata")? {
        Some(v) => Some(serde_json::from_value::<ProviderMetadata>(v)?),
        None => None,
    };

    Ok(Message {
        id: r.try_get("id")?,
        conversation_id: r.try_get("conversation_id")?,
        external_id: r.try_get("external_id")?,
        text: r.try_get("text")?,
        timestamp: r.try_get::<DateTime<Utc>, _>("timestamp")?,
        status: parse_enum(&status)?,
        direction: parse_enum(&direction)?,
        message_type: parse_enum(&message_type)?,
        sender: Sender {
            name: r.try_get("sender_name")?,
            number: r.try_get("sender_number")?,
        },
        provider_metadata,
        gs_app_id: r.try_get("gs_app_id")?,
        payload_id: r.try_get("payload_id")?,
        processing_times: ProcessingTimes {
            created_at: r.try_get("source_created_at")?,
            started_at: r.try_get("source_started_at")?,
            completed_at: r.try_get("source_completed_at")?,
            reconciled_at: r.try_get("reconciled_at")?,
        },
        executed: r.try_get("executed")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn insert(&self, message: &Message) -> Result<Message, Error> {
        message.validate().map_err(Error::Validation)?;

        let metadata = match &message.provider_metadata {
            Some(m) => Some(serde_json::to_value(m)?),
            None => None,
        };

        let sql = format!(
            r#"
            INSERT INTO messages (
                id, conversation_id, external_id, text, timestamp, status, direction,
                message_type, sender_name, sender_number, provider_metadata,
                gs_app_id, payload_id, source_created_at, source_started_at,
                source_completed_at, reconciled_at, executed, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(message.id)
            .bind(&message.conversation_id)
            .bind(&message.external_id)
            .bind(&message.text)
            .bind(message.timestamp)
            .bind(message.status.to_string())
            .bind(message.direction.to_string())
            .bind(message.message_type.to_string())
            .bind(&message.sender.name)
            .bind(&message.sender.number)
            .bind(metadata)
            .bind(&message.gs_app_id)
            .bind(&message.payload_id)
            .bind(message.processing_times.created_at)
            .bind(message.processing_times.started_at)
            .bind(message.processing_times.completed_at)
            .bind(message.processing_times.reconciled_at)
            .bind(message.executed)
            .bind(message.created_at)
            .bind(message.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match Error::from(e) {
                Error::DuplicateKey(_) => Error::DuplicateKey(message.external_id.clone()),
                other => other,
            })?;

        row_to_message(&row)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Message>, Error> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE external_id = $1");
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn apply_status(
        &self,
        external_id: &str,
        change: &StatusChange,
    ) -> Result<Option<Message>, Error> {
        // COALESCE keeps the stored timestamp when the receipt carried none.
        let sql = format!(
            r#"
            UPDATE messages
            SET status = $1,
                timestamp = COALESCE($2, timestamp),
                reconciled_at = $3,
                updated_at = now()
            WHERE external_id = $4
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(change.status.to_string())
            .bind(change.timestamp)
            .bind(change.reconciled_at)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        debug!("apply_status({}, {}) matched={}", external_id, change.status, row.is_some());
        row.as_ref().map(row_to_message).transpose()
    }

    async fn list_by_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, Error> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY timestamp ASC, created_at ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error> {
        let sql = format!(
            r#"
            WITH ranked AS (
                SELECT {MESSAGE_COLUMNS},
                       ROW_NUMBER() OVER (
                           PARTITION BY conversation_id
                           ORDER BY timestamp DESC, created_at DESC
                       ) AS newest_rank,
                       FIRST_VALUE(sender_name) OVER (
                           PARTITION BY conversation_id
                           ORDER BY timestamp ASC, created_at ASC
                       ) AS first_sender_name,
                       FIRST_VALUE(sender_number) OVER (
                           PARTITION BY conversation_id
                           ORDER BY timestamp ASC, created_at ASC
                       ) AS first_sender_number,
                       COUNT(*) OVER (PARTITION BY conversation_id) AS message_count
                FROM messages
            )
            SELECT *
            FROM ranked
            WHERE newest_rank = 1
            ORDER BY timestamp DESC
            "#
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows.iter() {
            let last_message = row_to_message(r)?;
            out.push(ConversationSummary {
                conversation_id: last_message.conversation_id.clone(),
                sender: Sender {
                    name: r.try_get("first_sender_name")?,
                    number: r.try_get("first_sender_number")?,
                },
                message_count: r.try_get("message_count")?,
                last_message,
            });
        }
        Ok(out)
    }
}

