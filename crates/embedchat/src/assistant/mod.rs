//! Assistant backends that produce streamed replies.

mod openai;
mod scripted;

use std::pin::Pin;

use async_trait::async_trait;
use embedchat_protocol::Source;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::chats::ChatRecord;
use crate::embed::ChatSettings;

pub use openai::OpenAiAssistant;
pub use scripted::ScriptedAssistant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the context sent to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything an assistant needs to answer one message.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantRequest {
    pub workspace: String,
    pub settings: ChatSettings,
    /// Earlier exchanges, oldest first.
    pub history: Vec<ContextMessage>,
    pub message: String,
}

impl AssistantRequest {
    pub fn new(
        workspace: impl Into<String>,
        settings: ChatSettings,
        records: &[ChatRecord],
        message: impl Into<String>,
    ) -> Self {
        let history = records
            .iter()
            .flat_map(|record| {
                [
                    ContextMessage::new(Role::User, record.prompt.clone()),
                    ContextMessage::new(Role::Assistant, record.response.text_response.clone()),
                ]
            })
            .collect();

        Self {
            workspace: workspace.into(),
            settings,
            history,
            message: message.into(),
        }
    }

    /// System prompt, prior context and the new user message in order.
    pub fn messages(&self) -> Vec<ContextMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = self.settings.prompt.as_deref() {
            messages.push(ContextMessage::new(Role::System, prompt));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ContextMessage::new(Role::User, self.message.clone()));
        messages
    }
}

/// A piece of a streamed reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantDelta {
    Text(String),
    Sources(Vec<Source>),
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Failed to reach assistant: {0}")]
    Request(String),

    #[error("Assistant returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Assistant stream failed: {0}")]
    Stream(String),
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<AssistantDelta, AssistantError>> + Send>>;

/// Produces a streamed reply for one chat message.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn respond(&self, request: AssistantRequest) -> Result<DeltaStream, AssistantError>;
}
