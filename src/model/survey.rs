use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assessment::AssessmentResult;

pub const MIN_RESPONSE: i64 = 0;
pub const MAX_RESPONSE: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyItem {
    pub question: String,
    pub response: u8,
}

/// One stored survey submission together with the result it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRecord {
    pub questions: Vec<String>,
    pub responses: Vec<u8>,
    pub result: AssessmentResult,
    pub age_group: Option<String>,
    pub gender: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SurveyRecord {
    pub fn new(
        items: &[SurveyItem],
        result: AssessmentResult,
        age_group: Option<String>,
        gender: Option<String>,
    ) -> Self {
        Self {
            questions: items.iter().map(|i| i.question.clone()).collect(),
            responses: items.iter().map(|i| i.response).collect(),
            result,
            age_group,
            gender,
            submitted_at: Utc::now(),
        }
    }
}
