//! Questionnaire sessions and spirit generation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chat_proto::{Role, Session, SessionUpdate};
use llm_core::generate_spirit;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::store::SessionPatch;
use crate::validation::{validate_session_id, validate_session_update};
use crate::AppState;

pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    state.metrics.record_request();
    let session = state.store.create_session().await?;
    info!("Created session {}", session.id);
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state.metrics.record_request();
    let id = validate_session_id(&id)?;
    let session = state
        .store
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(session))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<SessionUpdate>,
) -> Result<Json<Session>, ApiError> {
    state.metrics.record_request();
    let id = validate_session_id(&id)?;
    validate_session_update(&update)?;

    let session = state
        .store
        .update_session(id, SessionPatch::from(update))
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(session))
}

/// Turn the four answers into a spirit and open its conversation.
///
/// The conversation starts with the hidden system prompt followed by the
/// spirit's opening line.
pub async fn generate_session_spirit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state.metrics.record_request();
    let id = validate_session_id(&id)?;
    let session = state
        .store
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    let answers = session.answers().ok_or_else(|| {
        ApiError::InvalidArgument("All four questions must be answered first".to_string())
    })?;

    let timeout = state.config.turn_timeout();
    let spirit = match tokio::time::timeout(timeout, generate_spirit(state.llm.as_ref(), answers))
        .await
    {
        Ok(Ok(spirit)) => spirit,
        Ok(Err(e)) => {
            warn!("Spirit generation failed for session {id}: {e:#}");
            return Err(ApiError::UpstreamFailure(
                "Failed to generate spirit".to_string(),
            ));
        }
        Err(_) => {
            warn!("Spirit generation timed out after {}s", timeout.as_secs());
            return Err(ApiError::UpstreamFailure(format!(
                "Spirit generation timed out after {} seconds",
                timeout.as_secs()
            )));
        }
    };

    let conversation = state.store.create_conversation(&spirit.name).await?;
    for (role, content) in [
        (Role::System, &spirit.system_prompt),
        (Role::Assistant, &spirit.opening_line),
    ] {
        state
            .store
            .append_message(conversation.id, role, content)
            .await?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("conversation vanished")))?;
    }

    let updated = state
        .store
        .update_session(
            id,
            SessionPatch {
                spirit_name: Some(spirit.name.clone()),
                spirit_traits: Some(spirit.traits.clone()),
                conversation_id: Some(conversation.id),
                is_complete: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    info!(
        "Session {} summoned spirit '{}' in conversation {}",
        id, spirit.name, conversation.id
    );
    Ok(Json(updated))
}
