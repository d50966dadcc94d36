use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chat_proto::ErrorBody;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::InvalidArgument(msg) | ApiError::NotFound(msg) => msg,
            ApiError::UpstreamFailure(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                msg
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorBody {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
