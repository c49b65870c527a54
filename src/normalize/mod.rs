//! Turns free-form model replies into typed results.
//!
//! The `parse_*` functions report why a reply was rejected; the `normalize_*`
//! wrappers are total and fall back to the degraded sentinel (or the raw text
//! for image replies) so callers never see a parse failure.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::model::assessment::{AssessmentResult, ImageAssessment, RiskLevel, MAX_SCORE};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

const REQUIRED_ASSESSMENT_FIELDS: [&str; 4] = ["score", "risk_level", "analysis", "recommendations"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply JSON is not an object")]
    NotAnObject,

    #[error("reply is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is unusable: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Pick the part of `text` most likely to hold the JSON object: the body of a
/// ```` ```json ```` fence, else the first `{` through the last `}`, else the
/// whole input.
pub fn extract_json_block(text: &str) -> &str {
    if let Some(start) = text.find(JSON_FENCE) {
        let rest = &text[start + JSON_FENCE.len()..];
        if let Some(end) = rest.find(FENCE) {
            let candidate = rest[..end].trim();
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }

    if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
        if close > open {
            return &text[open..=close];
        }
    }

    text
}

fn parse_object(text: &str) -> Result<Map<String, Value>, NormalizeError> {
    let block = extract_json_block(text).trim();
    let value: Value =
        serde_json::from_str(block).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(NormalizeError::NotAnObject),
    }
}

pub fn parse_assessment(text: &str) -> Result<AssessmentResult, NormalizeError> {
    let object = parse_object(text)?;

    if let Some(missing) = REQUIRED_ASSESSMENT_FIELDS
        .iter()
        .find(|field| !object.contains_key(**field))
    {
        return Err(NormalizeError::MissingField(missing));
    }

    Ok(AssessmentResult {
        score: Some(coerce_score(&object["score"])?),
        risk_level: match &object["risk_level"] {
            Value::String(label) => RiskLevel::from_label(label),
            _ => RiskLevel::Unknown,
        },
        analysis: value_to_text(&object["analysis"]),
        recommendations: coerce_recommendations(&object["recommendations"]),
    })
}

pub fn parse_image_assessment(text: &str) -> Result<ImageAssessment, NormalizeError> {
    let object = parse_object(text)?;
    let field = |name: &str| match object.get(name) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value_to_text(value)),
    };
    Ok(ImageAssessment {
        emotion: field("emotion"),
        analysis: field("analysis"),
    })
}

pub fn normalize_assessment(text: &str) -> AssessmentResult {
    parse_assessment(text).unwrap_or_else(|err| {
        warn!(error = %err, "assessment reply rejected, returning degraded result");
        AssessmentResult::degraded()
    })
}

pub fn normalize_image_assessment(text: &str) -> ImageAssessment {
    parse_image_assessment(text).unwrap_or_else(|err| {
        warn!(error = %err, "image reply is not a JSON object, keeping raw text");
        ImageAssessment::raw(text)
    })
}

// ── coercion ────────────────────────────────────────────────────────────────

fn coerce_score(value: &Value) -> Result<u8, NormalizeError> {
    let invalid = |reason: &str| NormalizeError::InvalidField {
        field: "score",
        reason: reason.to_string(),
    };

    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| invalid("not representable"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .ok_or_else(|| invalid("not numeric"))?,
        _ => return Err(invalid("not numeric")),
    };

    Ok(number.clamp(0, MAX_SCORE) as u8)
}

fn coerce_recommendations(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_text(other)],
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
