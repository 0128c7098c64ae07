use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for score API operations
pub type Result<T, E = ScoreError> = std::result::Result<T, E>;

/// Errors surfaced to API callers.
///
/// Messages are deliberately generic. Verification and storage details are
/// logged where the error is raised and never returned to the client.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Unauthorized: Invalid Google Token")]
    Unauthorized,

    #[error("Forbidden: origin not allowed")]
    Forbidden,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ScoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            ScoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            ScoreError::Forbidden => StatusCode::FORBIDDEN,
            ScoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ScoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

impl IntoResponse for ScoreError {
    fn into_response(self) -> Response {
        let error = match &self {
            ScoreError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (self.status(), Json(ApiErrorResponse { error })).into_response()
    }
}
