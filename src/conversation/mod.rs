//! Per-session chat and survey history.
//!
//! Sessions live behind the [`SessionStore`] trait so the HTTP layer can plug
//! in whatever persistence it has. Updates are load-modify-save with no lock
//! held across the inference call; two concurrent requests on the same
//! session may race and the last save wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::message::Message;
use crate::model::survey::SurveyRecord;

#[derive(Debug, Error)]
#[error("session store error: {0}")]
pub struct StoreError(pub String);

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    /// `None` until the session first chats or resets.
    pub chat: Option<Vec<Message>>,
    pub surveys: Vec<SurveyRecord>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<SessionData, StoreError>;

    async fn save(&self, session_id: &str, data: SessionData) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<SessionData, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, session_id: &str, data: SessionData) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), data);
        Ok(())
    }
}

/// Sliding window: once the history exceeds `max_messages + 1` entries, keep
/// the first one (the standing instruction) and the last `max_messages`.
pub fn trim_history(mut history: Vec<Message>, max_messages: usize) -> Vec<Message> {
    if history.len() <= max_messages.saturating_add(1) {
        return history;
    }
    history.drain(1..history.len() - max_messages);
    history
}

#[derive(Clone)]
pub struct ContextManager {
    store: Arc<dyn SessionStore>,
    system_prompt: Message,
    max_history: usize,
}

impl ContextManager {
    pub fn new(store: Arc<dyn SessionStore>, system_prompt: Message, max_history: usize) -> Self {
        Self {
            store,
            system_prompt,
            max_history,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Stored conversation, if this session ever started one.
    pub async fn existing_chat(&self, session_id: &str) -> Result<Option<Vec<Message>>, StoreError> {
        Ok(self.store.load(session_id).await?.chat)
    }

    /// Stored conversation, or a fresh one holding only the system prompt.
    pub async fn chat_history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .existing_chat(session_id)
            .await?
            .unwrap_or_else(|| vec![self.system_prompt.clone()]))
    }

    pub async fn put_chat(&self, session_id: &str, history: Vec<Message>) -> Result<(), StoreError> {
        let history = trim_history(history, self.max_history);
        debug!(session_id, turns = history.len(), "saving chat history");
        let mut data = self.store.load(session_id).await?;
        data.chat = Some(history);
        self.store.save(session_id, data).await
    }

    pub async fn reset_chat(&self, session_id: &str) -> Result<(), StoreError> {
        let mut data = self.store.load(session_id).await?;
        data.chat = Some(vec![self.system_prompt.clone()]);
        self.store.save(session_id, data).await
    }

    pub async fn append_survey(&self, session_id: &str, record: SurveyRecord) -> Result<(), StoreError> {
        let mut data = self.store.load(session_id).await?;
        data.surveys.push(record);
        self.store.save(session_id, data).await
    }

    pub async fn survey_history(&self, session_id: &str) -> Result<Vec<SurveyRecord>, StoreError> {
        Ok(self.store.load(session_id).await?.surveys)
    }

    pub async fn reset_surveys(&self, session_id: &str) -> Result<(), StoreError> {
        let mut data = self.store.load(session_id).await?;
        data.surveys.clear();
        self.store.save(session_id, data).await
    }
}
