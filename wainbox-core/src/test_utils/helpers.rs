// File: wainbox-core/src/test_utils/helpers.rs

use serde_json::{json, Value};
use sqlx::{Pool, Postgres};
use crate::Error;
use crate::db::Database;

/// Connection string for the Postgres test database, if one is configured.
/// Tests that need Postgres return early when this is `None`.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|u| !u.trim().is_empty())
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("TRUNCATE TABLE messages;")
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns a migrated, empty test DB handle, or `None` without
/// `TEST_DATABASE_URL`.
pub async fn setup_test_database() -> Result<Option<Database>, Error> {
    let Some(url) = test_database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping Postgres test");
        return Ok(None);
    };
    let db = Database::new(&url, 5).await?;
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(Some(db))
}

/// A bare Meta webhook carrying one text message from `from`.
pub fn text_message_payload(wamid: &str, from: &str, name: &str, body: &str, timestamp: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "30164062719905277",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "918329446654",
                        "phone_number_id": "629305560276479"
                    },
                    "contacts": [{"profile": {"name": name}, "wa_id": from}],
                    "messages": [{
                        "from": from,
                        "id": wamid,
                        "timestamp": timestamp,
                        "text": {"body": body},
                        "type": "text"
                    }]
                }
            }]
        }]
    })
}

/// The same webhook as a BSP relay stores it: wrapped under `metaData`
/// together with the relay's id and processing times.
pub fn relay_wrapped(payload_id: &str, webhook: Value) -> Value {
    json!({
        "payload_type": "whatsapp_webhook",
        "_id": payload_id,
        "metaData": webhook,
        "createdAt": "2025-08-05 12:00:00",
        "startedAt": "2025-08-05 12:00:00",
        "completedAt": "2025-08-05 12:00:01",
        "executed": true
    })
}

/// A single-message webhook with a non-text message and no body.
pub fn media_message_payload(wamid: &str, from: &str, kind: &str) -> Value {
    json!({
        "entry": [{
            "changes": [{
                "field": "messages",
                "value": {
                    "contacts": [{"profile": {"name": "Ravi"}, "wa_id": from}],
                    "messages": [{"from": from, "id": wamid, "timestamp": "1700000000", "type": kind}]
                }
            }]
        }]
    })
}

/// A standalone delivery receipt.
pub fn status_payload(message_id: &str, status: &str) -> Value {
    json!({ "message_id": message_id, "status": status })
}
