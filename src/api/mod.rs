use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{request::Parts, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::assessment::AssessmentService;
use crate::config::UploadConfig;
use crate::error::AssessError;

pub mod handlers;
pub mod types;

use handlers::{
    assess_conversation, chat_history, evaluate, reset_chat, reset_survey_history, submit_chat,
    submit_survey, survey_history, upload_image,
};

pub const SESSION_HEADER: &str = "x-session-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// JSON or multipart framing around the image payload.
const BODY_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: AssessmentService,
    pub upload: UploadConfig,
}

/// Session key taken from the `x-session-id` header.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AssessError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| SessionId(v.to_string()))
            .ok_or_else(|| AssessError::InvalidInput(format!("missing `{SESSION_HEADER}` header")))
    }
}

/// Every request gets a span carrying a fresh id, echoed back in a header.
async fn request_span(req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub fn router(state: AppState) -> Router {
    // base64 inflates the payload by a third
    let upload_limit = (state.upload.max_bytes / 3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD);

    Router::new()
        .route("/api/chat", post(submit_chat))
        .route("/api/chat/reset", post(reset_chat))
        .route("/api/chat/history", get(chat_history))
        .route("/api/chat/assess", post(assess_conversation))
        .route("/api/survey", post(submit_survey))
        .route("/api/survey/history", get(survey_history))
        .route("/api/survey/reset", post(reset_survey_history))
        .route(
            "/api/evaluate",
            post(evaluate).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/image/upload",
            post(upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}
