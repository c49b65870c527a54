use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::Value;
use tracing::info;

use crate::api::types::{
    AssessResponse, ChatHistoryResponse, ChatRequest, ChatResponse, EvaluateRequest,
    EvaluateResponse, StatusResponse, SurveyHistoryResponse, SurveyRequest, SurveyResponse,
    UploadResponse,
};
use crate::api::{AppState, SessionId};
use crate::assessment::{ChatSubmission, CompositeRequest, SurveySubmission};
use crate::attachments::decode_base64_payload;
use crate::error::AssessError;

type ApiResult<T> = Result<Json<T>, AssessError>;

pub async fn submit_chat(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(req) = payload?;
    let reply = state
        .service
        .submit_chat(
            &session_id,
            ChatSubmission {
                messages: req.messages,
                message: req.message,
            },
        )
        .await?;
    Ok(Json(ChatResponse { reply }))
}

pub async fn reset_chat(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> ApiResult<StatusResponse> {
    state.service.reset_chat(&session_id).await?;
    Ok(Json(StatusResponse {
        status: "chat history reset",
    }))
}

pub async fn chat_history(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> ApiResult<ChatHistoryResponse> {
    let history = state.service.chat_history(&session_id).await?;
    Ok(Json(ChatHistoryResponse { history }))
}

pub async fn assess_conversation(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> ApiResult<AssessResponse> {
    let assessment = state.service.assess_conversation(&session_id).await?;
    Ok(Json(AssessResponse { assessment }))
}

pub async fn submit_survey(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    payload: Result<Json<SurveyRequest>, JsonRejection>,
) -> ApiResult<SurveyResponse> {
    let Json(req) = payload?;
    let (Some(questions), Some(responses)) = (req.questions, req.responses) else {
        return Err(AssessError::InvalidInput(
            "`questions` and `responses` lists are required".into(),
        ));
    };

    let submission = SurveySubmission {
        questions: string_questions(&questions)?,
        responses: integer_responses(&responses)?,
        age_group: req.age_group,
        gender: req.gender,
    };
    let result = state.service.submit_survey(&session_id, submission).await?;
    Ok(Json(result.into()))
}

pub async fn survey_history(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> ApiResult<SurveyHistoryResponse> {
    let history = state.service.survey_history(&session_id).await?;
    Ok(Json(SurveyHistoryResponse { history }))
}

pub async fn reset_survey_history(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> ApiResult<StatusResponse> {
    state.service.reset_survey_history(&session_id).await?;
    Ok(Json(StatusResponse {
        status: "survey history reset",
    }))
}

pub async fn evaluate(
    State(state): State<AppState>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> ApiResult<EvaluateResponse> {
    let Json(req) = payload?;
    let result = state
        .service
        .evaluate_composite(CompositeRequest {
            age_group: req.age_group,
            gender: req.gender,
            text: req.text.unwrap_or_default(),
            questions: req.questions,
            responses: req.responses,
            drawing: req.drawing,
        })
        .await?;
    Ok(Json(EvaluateResponse { result }))
}

/// Accepts a multipart `file` part or, failing that, a base64 `image` field.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadResponse> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut image_field: Option<String> = None;

    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.trim().is_empty() {
                    return Err(AssessError::InvalidInput("no file selected".into()));
                }
                if !state.upload.is_allowed(&filename) {
                    return Err(AssessError::UnsupportedUpload(format!(
                        "`{filename}` is not an allowed image type"
                    )));
                }
                let bytes = field.bytes().await?;
                info!(filename = %filename, bytes = bytes.len(), "image upload received");
                file_bytes = Some(bytes.to_vec());
                break;
            }
            "image" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    image_field = Some(text);
                }
            }
            _ => {}
        }
    }

    let bytes = match (file_bytes, image_field) {
        (Some(bytes), _) => bytes,
        (None, Some(encoded)) => decode_base64_payload(&encoded)?,
        (None, None) => return Err(AssessError::MissingUpload),
    };
    if bytes.is_empty() {
        return Err(AssessError::MissingUpload);
    }

    let result = state.service.analyze_image(bytes).await?;
    Ok(Json(UploadResponse {
        message: "upload successful",
        result,
    }))
}

fn string_questions(values: &[Value]) -> Result<Vec<String>, AssessError> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value.as_str().map(str::to_owned).ok_or_else(|| {
                AssessError::InvalidInput(format!("question {} is not a string", i + 1))
            })
        })
        .collect()
}

fn integer_responses(values: &[Value]) -> Result<Vec<i64>, AssessError> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value.as_i64().ok_or_else(|| {
                AssessError::InvalidInput(format!("response {} is not an integer", i + 1))
            })
        })
        .collect()
}
