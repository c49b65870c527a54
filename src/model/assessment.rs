use serde::{Deserialize, Serialize};

pub const DEGRADED_ANALYSIS: &str = "service unavailable";
pub const DEGRADED_RECOMMENDATION: &str = "retry later";

pub const MAX_SCORE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// Case-insensitive; anything outside low/medium/high maps to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Survey scoring outcome. `score` is `None` only for the degraded sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub score: Option<u8>,
    pub risk_level: RiskLevel,
    pub analysis: String,
    pub recommendations: Vec<String>,
}

impl AssessmentResult {
    pub fn degraded() -> Self {
        Self {
            score: None,
            risk_level: RiskLevel::Unknown,
            analysis: DEGRADED_ANALYSIS.to_string(),
            recommendations: vec![DEGRADED_RECOMMENDATION.to_string()],
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.score.is_none() && self.risk_level == RiskLevel::Unknown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAssessment {
    pub emotion: Option<String>,
    pub analysis: Option<String>,
}

impl ImageAssessment {
    /// Fallback when the model reply is not a JSON object: keep the raw text.
    pub fn raw(text: &str) -> Self {
        Self {
            emotion: None,
            analysis: Some(text.trim().to_string()),
        }
    }

    pub fn degraded() -> Self {
        Self {
            emotion: None,
            analysis: Some(DEGRADED_ANALYSIS.to_string()),
        }
    }
}
