use std::time::Duration;

use async_trait::async_trait;
use minijinja::Environment;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    BackendKind, ChatCompletionRequest, ChatCompletionResponse, CompletionBackend,
    InferenceError, InferenceRequest,
};
use crate::model::message::{Message, Role};

const BACKEND_NAME: &str = "local";
const PLAIN_PROMPT_TEMPLATE: &str = "plain_prompt";

static PROMPT_ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.add_template(
        PLAIN_PROMPT_TEMPLATE,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/templates/plain_prompt.jinja"
        )),
    )
    .expect("embedded plain prompt template");
    env
});

/// Which local endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalApi {
    /// OpenAI-compatible `/v1/chat/completions`.
    ChatCompletions,
    /// Ollama `/api/generate` with a flattened single-string prompt.
    Generate,
}

impl LocalApi {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "chat" | "chat_completions" => Some(LocalApi::ChatCompletions),
            "generate" => Some(LocalApi::Generate),
            _ => None,
        }
    }
}

pub struct LocalBackend {
    client: Client,
    base_url: String,
    model: String,
    api: LocalApi,
}

#[derive(Serialize)]
struct TemplateMessage<'a> {
    label: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    messages: &'a [TemplateMessage<'a>],
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Flatten a conversation into `Role: content` lines ending with an open
/// assistant turn, for endpoints that only take a single prompt string.
pub fn render_plain_prompt(messages: &[Message]) -> Result<String, InferenceError> {
    let lines: Vec<TemplateMessage<'_>> = messages
        .iter()
        .map(|m| TemplateMessage {
            label: match m.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            },
            content: m.content.as_str(),
        })
        .collect();
    PROMPT_ENV
        .get_template(PLAIN_PROMPT_TEMPLATE)
        .and_then(|t| t.render(TemplateContext { messages: &lines }))
        .map_err(|e| InferenceError::Template(e.to_string()))
}

impl LocalBackend {
    pub fn new(base_url: &str, model: &str, api: LocalApi) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api,
        }
    }

    fn chat_url(&self) -> String {
        if self.base_url.ends_with("/chat/completions") {
            self.base_url.clone()
        } else {
            format!("{}/v1/chat/completions", self.base_url)
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn chat_completions(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let timeout = request.params.timeout;
        let body = ChatCompletionRequest::new(&self.model, request);
        let response = self
            .client
            .post(self.chat_url())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_send(BACKEND_NAME, e, timeout))?;

        if !response.status().is_success() {
            return Err(InferenceError::from_status(BACKEND_NAME, response).await);
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|e| InferenceError::Decode {
                backend: BACKEND_NAME,
                message: e.to_string(),
            })?;
        parsed.into_content()
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let timeout = request.params.timeout;
        let prompt = render_plain_prompt(&request.messages)?;
        debug!(
            task = request.task.as_str(),
            prompt_len = prompt.len(),
            "sending flattened prompt to local generate endpoint"
        );
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: request
                .params
                .response_format
                .as_ref()
                .filter(|f| f.is_json())
                .map(|_| "json"),
            options: GenerateOptions {
                temperature: request.params.temperature,
                num_predict: request.params.max_tokens,
            },
        };
        let response = self
            .client
            .post(self.generate_url())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::from_send(BACKEND_NAME, e, timeout))?;

        if !response.status().is_success() {
            return Err(InferenceError::from_status(BACKEND_NAME, response).await);
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| InferenceError::Decode {
            backend: BACKEND_NAME,
            message: e.to_string(),
        })?;
        if parsed.response.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(parsed.response)
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        match self.api {
            LocalApi::ChatCompletions => self.chat_completions(request).await,
            LocalApi::Generate => self.generate(request).await,
        }
    }
}
