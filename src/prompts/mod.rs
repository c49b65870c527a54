//! Prompt construction for every assessment task.
//!
//! Everything here is pure: message lists in, message lists out. Prompt text
//! is kept in `lang/zh/prompts.json` and embedded at build time. Input
//! validation happens before these builders are called.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value;

use crate::model::message::Message;
use crate::model::survey::SurveyItem;

const UNKNOWN_DEMOGRAPHIC: &str = "unknown";
const SECTION_SEPARATOR: &str = "\n\n";

#[derive(Deserialize)]
struct PromptFile {
    chat_system: String,
    conversation_assessment: String,
    survey: SurveyPrompts,
    composite: CompositePrompts,
    image: ImagePrompts,
}

#[derive(Deserialize)]
struct SurveyPrompts {
    system: String,
    instructions: String,
    details_heading: String,
}

#[derive(Deserialize)]
struct CompositePrompts {
    system: String,
    age_label: String,
    gender_label: String,
    text_label: String,
    questions_label: String,
    answers_label: String,
    image_label: String,
    report: String,
}

#[derive(Deserialize)]
struct ImagePrompts {
    system: String,
    template: String,
}

macro_rules! prompt_file {
    ($lang:literal) => {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/lang/",
            $lang,
            "/prompts.json"
        ))
    };
}

static ZH_PROMPTS: Lazy<PromptFile> =
    Lazy::new(|| serde_json::from_str(prompt_file!("zh")).expect("invalid prompt config"));

/// Inputs for the narrative multi-source report.
#[derive(Debug, Clone, Copy)]
pub struct CompositeInput<'a> {
    pub age_group: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub text: &'a str,
    pub questions: &'a [Value],
    pub answers: &'a [Value],
    pub image_analysis: Option<&'a str>,
}

pub fn chat_system_message() -> Message {
    Message::system(ZH_PROMPTS.chat_system.as_str())
}

pub fn conversation_assessment_instruction() -> &'static str {
    &ZH_PROMPTS.conversation_assessment
}

/// The history as sent to the model. An extra instruction goes in front of
/// everything, pushing the standing system prompt to index 1.
pub fn chat_messages(history: &[Message], instruction: Option<&str>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(instruction) = instruction.filter(|i| !i.trim().is_empty()) {
        messages.push(Message::system(instruction));
    }
    messages.extend_from_slice(history);
    messages
}

pub fn survey_prompt(items: &[SurveyItem]) -> String {
    let details = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {} → 回答：{}分", i + 1, item.question, item.response))
        .collect::<Vec<_>>()
        .join("\n");
    let survey = &ZH_PROMPTS.survey;
    format!("{}\n{}\n{}", survey.instructions, survey.details_heading, details)
}

pub fn survey_messages(items: &[SurveyItem]) -> Vec<Message> {
    vec![
        Message::system(ZH_PROMPTS.survey.system.as_str()),
        Message::user(survey_prompt(items)),
    ]
}

pub fn composite_prompt(input: &CompositeInput<'_>) -> String {
    let labels = &ZH_PROMPTS.composite;
    let questions = serde_json::to_string_pretty(input.questions).unwrap_or_default();
    let answers = serde_json::to_string(input.answers).unwrap_or_default();

    let mut sections = vec![
        format!(
            "{}：{}",
            labels.age_label,
            input.age_group.unwrap_or(UNKNOWN_DEMOGRAPHIC)
        ),
        format!(
            "{}：{}",
            labels.gender_label,
            input.gender.unwrap_or(UNKNOWN_DEMOGRAPHIC)
        ),
        format!("{}：\n{}", labels.text_label, input.text),
        format!("{}：\n{}", labels.questions_label, questions),
        format!("{}：\n{}", labels.answers_label, answers),
    ];
    if let Some(image) = input.image_analysis.filter(|s| !s.trim().is_empty()) {
        sections.push(format!("{}：\n{}", labels.image_label, image));
    }
    sections.push(labels.report.clone());
    sections.join(SECTION_SEPARATOR)
}

pub fn composite_messages(input: &CompositeInput<'_>) -> Vec<Message> {
    vec![
        Message::system(ZH_PROMPTS.composite.system.as_str()),
        Message::user(composite_prompt(input)),
    ]
}

/// `png` must already be preprocessed; it is embedded as a data URI.
pub fn image_messages(png: &[u8]) -> Vec<Message> {
    let image = &ZH_PROMPTS.image;
    vec![
        Message::system(image.system.as_str()),
        Message::user(format!(
            "{}\n\ndata:image/png;base64,{}",
            image.template,
            BASE64.encode(png)
        )),
    ]
}
