// File: src/api/webhook.rs
//
// Meta's subscription handshake and the live delivery endpoint. A POSTed
// body goes through the same driver path as a payload file.

use std::collections::HashMap;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::ingest::source::InlineSource;

const SUBSCRIBE_MODE: &str = "subscribe";

pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = query.get("hub.mode").map(String::as_str).unwrap_or_default();
    let token = query.get("hub.verify_token").map(String::as_str);
    let challenge = query.get("hub.challenge").cloned().unwrap_or_default();

    match (&state.verify_token, token) {
        (Some(expected), Some(got)) if mode == SUBSCRIBE_MODE && expected == got => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            warn!("Webhook verification rejected (mode={:?})", mode);
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

pub async fn receive(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let source = InlineSource::new("webhook", body.to_vec());
    let report = state.driver.process_source(&source).await?;
    Ok(Json(json!({ "data": { "report": report } })))
}
