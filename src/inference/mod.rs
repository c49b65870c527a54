pub mod cloud;
pub mod local;
pub mod reasoning;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BackendSelection, InferenceConfig};
use crate::model::message::Message;

pub use cloud::CloudBackend;
pub use local::{LocalApi, LocalBackend};
pub use reasoning::strip_reasoning_trace;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{backend} request timed out after {secs}s")]
    Timeout { backend: &'static str, secs: u64 },

    #[error("{backend} transport error: {source}")]
    Transport {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("backend returned empty content")]
    EmptyResponse,

    #[error("{backend} response could not be decoded: {message}")]
    Decode {
        backend: &'static str,
        message: String,
    },

    #[error("prompt template error: {0}")]
    Template(String),
}

impl InferenceError {
    pub(crate) fn from_send(backend: &'static str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout {
                backend,
                secs: timeout.as_secs(),
            }
        } else {
            InferenceError::Transport {
                backend,
                source: err,
            }
        }
    }

    pub(crate) async fn from_status(backend: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        InferenceError::Status {
            backend,
            status,
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Chat,
    Survey,
    Composite,
    Image,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Chat => "chat",
            TaskKind::Survey => "survey",
            TaskKind::Composite => "composite",
            TaskKind::Image => "image",
        }
    }

    pub fn params(&self) -> ModelParams {
        match self {
            TaskKind::Chat => ModelParams {
                temperature: Some(0.7),
                max_tokens: Some(1000),
                response_format: None,
                timeout: Duration::from_secs(60),
            },
            TaskKind::Survey => ModelParams {
                temperature: Some(0.3),
                max_tokens: Some(500),
                response_format: Some(ResponseFormat::json_object()),
                timeout: Duration::from_secs(30),
            },
            TaskKind::Image => ModelParams {
                temperature: Some(0.7),
                max_tokens: Some(500),
                response_format: Some(ResponseFormat::json_object()),
                timeout: Duration::from_secs(60),
            },
            TaskKind::Composite => ModelParams {
                temperature: None,
                max_tokens: None,
                response_format: None,
                timeout: Duration::from_secs(30),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.kind == "json_object"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
    pub timeout: Duration,
}

/// One unit of work for a backend. Never persisted.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub task: TaskKind,
    pub messages: Vec<Message>,
    pub params: ModelParams,
}

impl InferenceRequest {
    pub fn for_task(task: TaskKind, messages: Vec<Message>) -> Self {
        Self {
            task,
            messages,
            params: task.params(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Cloud,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> BackendKind;

    /// Raw model text, before reasoning-trace stripping.
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// Wire shapes shared by OpenAI-compatible endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<&'a ResponseFormat>,
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn new(model: &'a str, request: &'a InferenceRequest) -> Self {
        Self {
            model,
            messages: &request.messages,
            stream: false,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            response_format: request.params.response_format.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    // Ollama's native /api/chat shape.
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    pub fn into_content(self) -> Result<String, InferenceError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .or(self.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Executes requests against exactly one configured backend.
#[derive(Clone)]
pub struct InferenceGateway {
    backend: Arc<dyn CompletionBackend>,
}

impl InferenceGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        let backend: Arc<dyn CompletionBackend> = match &config.backend {
            BackendSelection::Local { base_url, model, api } => {
                Arc::new(LocalBackend::new(base_url, model, *api))
            }
            BackendSelection::Cloud {
                base_url,
                model,
                api_key,
            } => Arc::new(CloudBackend::new(base_url, model, api_key)),
        };
        info!(
            backend = backend.name(),
            "inference gateway configured"
        );
        Self::new(backend)
    }

    /// Single attempt. The reply has its reasoning trace removed and is trimmed.
    pub async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let raw = self.backend.complete(request).await?;
        debug!(
            backend = self.backend.name(),
            task = request.task.as_str(),
            raw = raw.as_str(),
            "raw model reply"
        );
        Ok(strip_reasoning_trace(&raw).trim().to_string())
    }

    /// Retries failed calls up to `attempts` times in total, without delay.
    /// Local backends always get a single attempt.
    pub async fn complete_with_retry(
        &self,
        request: &InferenceRequest,
        attempts: u32,
    ) -> Result<String, InferenceError> {
        let attempts = match self.backend.kind() {
            BackendKind::Local => 1,
            BackendKind::Cloud => attempts.max(1),
        };

        let mut attempt = 1;
        loop {
            match self.complete(request).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!(
                            backend = self.backend.name(),
                            task = request.task.as_str(),
                            attempt,
                            "backend recovered after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(err) => {
                    warn!(
                        backend = self.backend.name(),
                        task = request.task.as_str(),
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "inference attempt failed"
                    );
                    if attempt >= attempts {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Replays canned replies in order and records every request it sees.
    pub struct ScriptedBackend {
        kind: BackendKind,
        replies: Mutex<VecDeque<Result<String, InferenceError>>>,
        pub requests: Mutex<Vec<InferenceRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub fn new(kind: BackendKind, replies: Vec<Result<String, InferenceError>>) -> Self {
            Self {
                kind,
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn replying(kind: BackendKind, reply: &str) -> Self {
            Self::new(kind, vec![Ok(reply.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<InferenceRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(InferenceError::EmptyResponse))
        }
    }
}
