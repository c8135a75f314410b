//! API error handling
//!
//! Error bodies are plain text. Validation failures echo their message;
//! pipeline failures are logged and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kgx_core::KgxError;

/// Body of every 500 response
pub const EXTRACTION_FAILED: &str = "Extraction failed";

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[source] KgxError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Extraction(err) => {
                tracing::error!(error = %err, "Extraction failed");
                (StatusCode::INTERNAL_SERVER_ERROR, EXTRACTION_FAILED).into_response()
            }
        }
    }
}

impl From<KgxError> for AppError {
    fn from(err: KgxError) -> Self {
        match err {
            KgxError::ValidationError(msg) => AppError::BadRequest(msg),
            other => AppError::Extraction(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let bad = AppError::from(KgxError::ValidationError("Missing text parameter".into()));
        assert_eq!(bad.into_response().status(), StatusCode::BAD_REQUEST);

        let failed = AppError::from(KgxError::LinkerError("timeout".into()));
        assert_eq!(failed.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
