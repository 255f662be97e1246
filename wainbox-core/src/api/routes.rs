// File: src/api/routes.rs

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub text: String,
}

pub async fn list_conversations(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let conversations = state.message_service.conversations().await?;
    Ok(Json(json!({ "data": { "conversations": conversations } })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(wa_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.message_service.messages_for(&wa_id).await?;
    Ok(Json(json!({ "data": { "messages": messages } })))
}

pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let message = state
        .message_service
        .create_outbound(&req.wa_id, &req.text)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": { "message": message } }))))
}

pub async fn health() -> &'static str {
    "ok"
}
