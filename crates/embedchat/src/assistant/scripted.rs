//! Assistant that replays canned replies. Used by tests and offline runs.

use std::sync::Arc;

use async_trait::async_trait;
use embedchat_protocol::Source;
use tokio::sync::Mutex;

use super::{Assistant, AssistantDelta, AssistantError, AssistantRequest, DeltaStream};

#[derive(Debug, Clone, Default)]
enum Script {
    /// Repeat the user message back word by word.
    #[default]
    Echo,
    Chunks(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedAssistant {
    script: Script,
    sources: Vec<Source>,
    failure: Option<String>,
    last_request: Arc<Mutex<Option<AssistantRequest>>>,
}

impl ScriptedAssistant {
    /// Echo every message back.
    pub fn echo() -> Self {
        Self::default()
    }

    /// Reply with `chunks` in order.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Chunks(chunks.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Attach sources after the text.
    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    /// Fail with `message` after the scripted chunks.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// The most recent request this assistant answered.
    pub async fn last_request(&self) -> Option<AssistantRequest> {
        self.last_request.lock().await.clone()
    }

    fn reply_chunks(&self, message: &str) -> Vec<String> {
        match &self.script {
            Script::Chunks(chunks) => chunks.clone(),
            Script::Echo => {
                let mut chunks = Vec::new();
                for (i, word) in message.split_whitespace().enumerate() {
                    if i == 0 {
                        chunks.push(word.to_string());
                    } else {
                        chunks.push(format!(" {word}"));
                    }
                }
                chunks
            }
        }
    }
}

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn respond(&self, request: AssistantRequest) -> Result<DeltaStream, AssistantError> {
        let mut items: Vec<Result<AssistantDelta, AssistantError>> = self
            .reply_chunks(&request.message)
            .into_iter()
            .map(|chunk| Ok(AssistantDelta::Text(chunk)))
            .collect();

        if !self.sources.is_empty() {
            items.push(Ok(AssistantDelta::Sources(self.sources.clone())));
        }
        if let Some(message) = &self.failure {
            items.push(Err(AssistantError::Stream(message.clone())));
        }

        *self.last_request.lock().await = Some(request);

        Ok(Box::pin(futures::stream::iter(items)))
    }
}
