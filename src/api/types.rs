use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::assessment::{AssessmentResult, ImageAssessment, RiskLevel};
use crate::model::message::Message;
use crate::model::survey::SurveyRecord;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct AssessResponse {
    pub assessment: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct SurveyRequest {
    /// Both lists are kept loose so wrongly typed entries surface as
    /// `invalid_input` rather than a body rejection.
    #[serde(default)]
    pub questions: Option<Vec<Value>>,
    #[serde(default)]
    pub responses: Option<Vec<Value>>,
    #[serde(rename = "ageGroup", default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SurveyResponse {
    pub status: &'static str,
    pub score: Option<u8>,
    pub analysis: String,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
}

impl From<AssessmentResult> for SurveyResponse {
    fn from(result: AssessmentResult) -> Self {
        Self {
            status: "success",
            score: result.score,
            analysis: result.analysis,
            risk_level: result.risk_level,
            recommendations: result.recommendations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SurveyHistoryResponse {
    pub history: Vec<SurveyRecord>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(rename = "ageGroup", default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub questions: Vec<Value>,
    #[serde(default)]
    pub responses: Vec<Value>,
    #[serde(default)]
    pub drawing: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub result: ImageAssessment,
}
