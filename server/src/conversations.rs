//! Conversation CRUD. Sending a message lives in [`crate::stream`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chat_proto::{Conversation, ConversationWithMessages, CreateConversationRequest};

use crate::error::ApiError;
use crate::validation::{validate_conversation_id, validate_title};
use crate::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    state.metrics.record_request();
    Ok(Json(state.store.list_conversations().await?))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationRequest>>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    state.metrics.record_request();
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let title = validate_title(request.title.as_deref())?;
    let conversation = state.store.create_conversation(&title).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Persisted conversation with every message in order, system prompt included.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationWithMessages>, ApiError> {
    state.metrics.record_request();
    let id = validate_conversation_id(&id)?;
    let conversation = state
        .store
        .get_conversation(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.metrics.record_request();
    let id = validate_conversation_id(&id)?;
    if state.store.delete_conversation(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Conversation not found".to_string()))
    }
}
