use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::extract::ClientInfo;
use super::{ApiError, ApiResponse, AppState};
use crate::services::{ChatReply, Decision};

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ClientInfo(meta): ClientInfo,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, ApiError> {
    if let Decision::Limited { retry_after_secs } = state
        .shared
        .chat_limiter
        .check_and_record(meta.rate_key())
        .await?
    {
        return Err(ApiError::TooManyRequests { retry_after_secs });
    }

    let reply = state.shared.chat.reply(&payload.message).await?;
    tracing::debug!(source = ?reply.source, "Chat reply sent");

    Ok(Json(ApiResponse::success(reply)))
}
