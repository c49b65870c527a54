//! Mental-health self-assessment backend: prompt orchestration around an
//! LLM completion endpoint and normalization of whatever it sends back.

use std::sync::Arc;

pub mod api;
pub mod assessment;
pub mod attachments;
pub mod config;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod prompts;

use api::AppState;
use assessment::AssessmentService;
use attachments::{ImagePreprocessor, ThumbnailPreprocessor};
use config::Config;
use conversation::{ContextManager, MemorySessionStore, SessionStore};
use inference::InferenceGateway;

/// Wire the service graph for `config` around an already-built gateway.
pub fn build_state(config: &Config, gateway: InferenceGateway) -> AppState {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let context = ContextManager::new(store, prompts::chat_system_message(), config.max_history);
    let preprocessor: Arc<dyn ImagePreprocessor> =
        Arc::new(ThumbnailPreprocessor::new(config.upload.max_image_dimension));

    AppState {
        service: AssessmentService::new(
            gateway,
            context,
            preprocessor,
            config.survey_retry_attempts,
        )
        .with_max_image_bytes(config.upload.max_bytes),
        upload: config.upload.clone(),
    }
}
