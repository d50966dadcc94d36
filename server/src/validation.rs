use chat_proto::SessionUpdate;

use crate::error::ApiError;

/// Maximum length of one chat utterance, in characters
const MAX_MESSAGE_LENGTH: usize = 4000;
/// Maximum length of one questionnaire answer, in characters
const MAX_ANSWER_LENGTH: usize = 2000;
const MAX_TITLE_LENGTH: usize = 200;

/// Validate an utterance and return it trimmed
pub fn validate_utterance(content: &str) -> Result<String, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidArgument("Message cannot be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::InvalidArgument(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Parse a numeric path id (conversation or session)
pub fn validate_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::InvalidArgument(format!(
            "Invalid {what} id: {raw}. Expected a positive integer"
        ))),
    }
}

pub fn validate_conversation_id(raw: &str) -> Result<i64, ApiError> {
    validate_id(raw, "conversation")
}

pub fn validate_session_id(raw: &str) -> Result<i64, ApiError> {
    validate_id(raw, "session")
}

pub fn validate_session_update(update: &SessionUpdate) -> Result<(), ApiError> {
    for (i, answer) in update.answers().iter().enumerate() {
        if let Some(answer) = answer {
            if answer.chars().count() > MAX_ANSWER_LENGTH {
                return Err(ApiError::InvalidArgument(format!(
                    "Answer {} too long (max {} characters)",
                    i + 1,
                    MAX_ANSWER_LENGTH
                )));
            }
        }
    }
    Ok(())
}

/// Normalize an optional conversation title
pub fn validate_title(title: Option<&str>) -> Result<String, ApiError> {
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("New conversation");
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ApiError::InvalidArgument(format!(
            "Title too long (max {} characters)",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}
