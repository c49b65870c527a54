//! Request-level error taxonomy.
//!
//! Validation problems are reported to the caller verbatim with a 4xx status.
//! Backend failures are logged with full detail and the client only sees a
//! generic message, so transport errors and model output never leak.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::conversation::StoreError;
use crate::inference::InferenceError;

#[derive(Debug, Error)]
pub enum AssessError {
    /// Missing or malformed request fields, detected before any backend call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Request body could not be decoded at all.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no conversation history available for assessment")]
    NoHistory,

    #[error("no upload data found")]
    MissingUpload,

    #[error("unsupported upload: {0}")]
    UnsupportedUpload(String),

    #[error("image is {size} bytes, the limit is {limit}")]
    UploadTooLarge { size: usize, limit: usize },

    #[error("inference unavailable: {0}")]
    InferenceUnavailable(#[from] InferenceError),

    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AssessError {
    pub fn code(&self) -> &'static str {
        match self {
            AssessError::InvalidInput(_) => "invalid_input",
            AssessError::InvalidRequest(_) => "invalid_request",
            AssessError::NoHistory => "no_history",
            AssessError::MissingUpload => "missing_upload",
            AssessError::UnsupportedUpload(_) => "unsupported_type",
            AssessError::UploadTooLarge { .. } => "upload_too_large",
            AssessError::InferenceUnavailable(_) => "inference_unavailable",
            AssessError::MalformedModelOutput(_) => "malformed_model_output",
            AssessError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AssessError::InvalidInput(_)
            | AssessError::InvalidRequest(_)
            | AssessError::NoHistory
            | AssessError::MissingUpload => StatusCode::BAD_REQUEST,
            AssessError::UnsupportedUpload(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AssessError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AssessError::InferenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AssessError::MalformedModelOutput(_) => StatusCode::BAD_GATEWAY,
            AssessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AssessError {
    fn from(e: StoreError) -> Self {
        AssessError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for AssessError {
    fn from(rejection: JsonRejection) -> Self {
        AssessError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AssessError {
    fn from(rejection: MultipartRejection) -> Self {
        AssessError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AssessError {
    fn from(e: MultipartError) -> Self {
        AssessError::InvalidRequest(e.body_text())
    }
}

impl IntoResponse for AssessError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AssessError::InvalidInput(_)
            | AssessError::InvalidRequest(_)
            | AssessError::NoHistory
            | AssessError::MissingUpload
            | AssessError::UnsupportedUpload(_)
            | AssessError::UploadTooLarge { .. } => self.to_string(),
            AssessError::InferenceUnavailable(e) => {
                error!(error = %e, "inference backend unavailable");
                "assessment service is temporarily unavailable, please retry later".to_owned()
            }
            AssessError::MalformedModelOutput(m) => {
                error!(detail = %m, "model returned unusable output");
                "assessment service returned an unusable result, please retry later".to_owned()
            }
            AssessError::Internal(m) => {
                error!(detail = %m, "internal server error");
                "internal server error".to_owned()
            }
        };
        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}
