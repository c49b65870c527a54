//! Top-level use cases. Each one builds a prompt, runs it through the
//! gateway and normalizes the reply, then decides whether a failure becomes a
//! fallback value or an error for the caller.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::attachments::{decode_base64_payload, ImagePreprocessor};
use crate::config::UploadConfig;
use crate::conversation::{trim_history, ContextManager};
use crate::error::AssessError;
use crate::inference::{InferenceGateway, InferenceRequest, TaskKind};
use crate::model::assessment::{AssessmentResult, ImageAssessment};
use crate::model::message::Message;
use crate::model::survey::{SurveyItem, SurveyRecord, MAX_RESPONSE, MIN_RESPONSE};
use crate::normalize::{normalize_assessment, normalize_image_assessment};
use crate::prompts::{self, CompositeInput};

pub const BUSY_REPLY: &str = "service busy, please try again later";

/// Either a full replacement history or a single new user message.
#[derive(Debug, Clone, Default)]
pub struct ChatSubmission {
    pub messages: Option<Vec<Message>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SurveySubmission {
    pub questions: Vec<String>,
    pub responses: Vec<i64>,
    pub age_group: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeRequest {
    pub age_group: Option<String>,
    pub gender: Option<String>,
    pub text: String,
    pub questions: Vec<Value>,
    pub responses: Vec<Value>,
    /// Plain base64 or a `data:` URI.
    pub drawing: Option<String>,
}

#[derive(Clone)]
pub struct AssessmentService {
    gateway: InferenceGateway,
    context: ContextManager,
    preprocessor: Arc<dyn ImagePreprocessor>,
    survey_attempts: u32,
    max_image_bytes: usize,
}

/// Pair questions with responses, rejecting mismatched lengths and
/// out-of-range answers.
pub fn validate_survey(questions: &[String], responses: &[i64]) -> Result<Vec<SurveyItem>, AssessError> {
    if questions.len() != responses.len() {
        return Err(AssessError::InvalidInput(format!(
            "question count ({}) does not match response count ({})",
            questions.len(),
            responses.len()
        )));
    }

    questions
        .iter()
        .zip(responses)
        .enumerate()
        .map(|(i, (question, &response))| {
            if !(MIN_RESPONSE..=MAX_RESPONSE).contains(&response) {
                return Err(AssessError::InvalidInput(format!(
                    "response {} is {response}, expected an integer between {MIN_RESPONSE} and {MAX_RESPONSE}",
                    i + 1
                )));
            }
            Ok(SurveyItem {
                question: question.clone(),
                response: response as u8,
            })
        })
        .collect()
}

impl AssessmentService {
    pub fn new(
        gateway: InferenceGateway,
        context: ContextManager,
        preprocessor: Arc<dyn ImagePreprocessor>,
        survey_attempts: u32,
    ) -> Self {
        Self {
            gateway,
            context,
            preprocessor,
            survey_attempts,
            max_image_bytes: UploadConfig::default().max_bytes,
        }
    }

    /// Cap on decoded image size, applied to uploads and composite drawings.
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    // ── chat ────────────────────────────────────────────────────────────────

    /// Always returns a reply; backend trouble yields [`BUSY_REPLY`].
    pub async fn process_chat(&self, history: &[Message], instruction: Option<&str>) -> String {
        let window = trim_history(history.to_vec(), self.context.max_history());
        let request = InferenceRequest::for_task(
            TaskKind::Chat,
            prompts::chat_messages(&window, instruction),
        );

        match self.gateway.complete(&request).await {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => {
                warn!(task = "chat", "model returned nothing after reasoning strip");
                BUSY_REPLY.to_string()
            }
            Err(err) => {
                warn!(task = "chat", error = %err, "chat completion failed");
                BUSY_REPLY.to_string()
            }
        }
    }

    pub async fn submit_chat(
        &self,
        session_id: &str,
        submission: ChatSubmission,
    ) -> Result<String, AssessError> {
        let mut history = match (submission.messages, submission.message) {
            (Some(messages), _) if !messages.is_empty() => messages,
            (_, Some(message)) if !message.trim().is_empty() => {
                let mut history = self.context.chat_history(session_id).await?;
                history.push(Message::user(message));
                history
            }
            _ => {
                return Err(AssessError::InvalidInput(
                    "either `messages` or `message` is required".into(),
                ))
            }
        };

        let reply = self.process_chat(&history, None).await;
        history.push(Message::assistant(reply.clone()));
        self.context.put_chat(session_id, history).await?;
        Ok(reply)
    }

    pub async fn reset_chat(&self, session_id: &str) -> Result<(), AssessError> {
        info!(session_id, "chat history reset");
        Ok(self.context.reset_chat(session_id).await?)
    }

    pub async fn chat_history(&self, session_id: &str) -> Result<Vec<Message>, AssessError> {
        Ok(self.context.chat_history(session_id).await?)
    }

    /// Narrative assessment of the stored conversation. Not added to history.
    pub async fn assess_conversation(&self, session_id: &str) -> Result<String, AssessError> {
        let history = self
            .context
            .existing_chat(session_id)
            .await?
            .ok_or(AssessError::NoHistory)?;
        Ok(self
            .process_chat(&history, Some(prompts::conversation_assessment_instruction()))
            .await)
    }

    // ── survey ──────────────────────────────────────────────────────────────

    /// Invalid input is rejected before any backend call. Backend or parse
    /// failures give the degraded result rather than an error.
    pub async fn process_survey(
        &self,
        questions: &[String],
        responses: &[i64],
    ) -> Result<AssessmentResult, AssessError> {
        let items = validate_survey(questions, responses)?;
        Ok(self.score_survey(&items).await)
    }

    async fn score_survey(&self, items: &[SurveyItem]) -> AssessmentResult {
        let request = InferenceRequest::for_task(TaskKind::Survey, prompts::survey_messages(items));
        match self
            .gateway
            .complete_with_retry(&request, self.survey_attempts)
            .await
        {
            Ok(text) => normalize_assessment(&text),
            Err(err) => {
                warn!(task = "survey", error = %err, "survey scoring unavailable");
                AssessmentResult::degraded()
            }
        }
    }

    pub async fn submit_survey(
        &self,
        session_id: &str,
        submission: SurveySubmission,
    ) -> Result<AssessmentResult, AssessError> {
        let items = validate_survey(&submission.questions, &submission.responses)?;
        let result = self.score_survey(&items).await;

        info!(
            session_id,
            items = items.len(),
            risk_level = result.risk_level.as_str(),
            degraded = result.is_degraded(),
            "survey scored"
        );

        let record = SurveyRecord::new(&items, result.clone(), submission.age_group, submission.gender);
        self.context.append_survey(session_id, record).await?;
        Ok(result)
    }

    pub async fn survey_history(&self, session_id: &str) -> Result<Vec<SurveyRecord>, AssessError> {
        Ok(self.context.survey_history(session_id).await?)
    }

    pub async fn reset_survey_history(&self, session_id: &str) -> Result<(), AssessError> {
        Ok(self.context.reset_surveys(session_id).await?)
    }

    // ── composite ───────────────────────────────────────────────────────────

    /// Single attempt; backend failures and empty replies go to the caller.
    pub async fn evaluate_all(&self, input: &CompositeInput<'_>) -> Result<String, AssessError> {
        let request =
            InferenceRequest::for_task(TaskKind::Composite, prompts::composite_messages(input));
        let report = self.gateway.complete(&request).await?;
        if report.is_empty() {
            return Err(AssessError::MalformedModelOutput(
                "composite report is empty after reasoning strip".into(),
            ));
        }
        Ok(report)
    }

    pub async fn evaluate_composite(&self, request: CompositeRequest) -> Result<String, AssessError> {
        let image_analysis = match request.drawing.as_deref().map(str::trim) {
            Some(drawing) if !drawing.is_empty() => {
                let bytes = decode_base64_payload(drawing)?;
                let analysis = self.analyze_image(bytes).await?;
                Some(
                    serde_json::to_string(&analysis)
                        .map_err(|e| AssessError::Internal(e.to_string()))?,
                )
            }
            _ => None,
        };

        let input = CompositeInput {
            age_group: request.age_group.as_deref(),
            gender: request.gender.as_deref(),
            text: &request.text,
            questions: &request.questions,
            answers: &request.responses,
            image_analysis: image_analysis.as_deref(),
        };
        self.evaluate_all(&input).await
    }

    // ── image ───────────────────────────────────────────────────────────────

    /// Undecodable uploads are errors. Once the image is prepared, backend
    /// failures give the degraded value and unparseable replies keep the raw
    /// text.
    pub async fn analyze_image(&self, bytes: Vec<u8>) -> Result<ImageAssessment, AssessError> {
        if bytes.len() > self.max_image_bytes {
            return Err(AssessError::UploadTooLarge {
                size: bytes.len(),
                limit: self.max_image_bytes,
            });
        }

        let preprocessor = Arc::clone(&self.preprocessor);
        let png = tokio::task::spawn_blocking(move || preprocessor.prepare(&bytes))
            .await
            .map_err(|e| AssessError::Internal(format!("image preprocessing task failed: {e}")))??;

        let request = InferenceRequest::for_task(TaskKind::Image, prompts::image_messages(&png));
        match self.gateway.complete(&request).await {
            Ok(text) => Ok(normalize_image_assessment(&text)),
            Err(err) => {
                warn!(task = "image", error = %err, "image analysis unavailable");
                Ok(ImageAssessment::degraded())
            }
        }
    }
}
