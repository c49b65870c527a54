use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{
    BackendKind, ChatCompletionRequest, ChatCompletionResponse, CompletionBackend,
    InferenceError, InferenceRequest,
};

const BACKEND_NAME: &str = "cloud";

/// Hosted OpenAI-style completion API (DeepSeek by default).
pub struct CloudBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl CloudBackend {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for CloudBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let timeout = request.params.timeout;
        let body = ChatCompletionRequest::new(&self.model, request);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
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
}
