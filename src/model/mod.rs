pub mod assessment;
pub mod message;
pub mod survey;

pub use assessment::{AssessmentResult, ImageAssessment, RiskLevel};
pub use message::{Message, Role};
pub use survey::{SurveyItem, SurveyRecord};
