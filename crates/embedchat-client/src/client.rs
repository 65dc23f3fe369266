use std::time::Duration;

use embedchat_protocol::{
    ChatTurn, CommentRequest, FeedbackRequest, FeedbackResponse, HistoryResponse, StreamEvent,
    encode_request,
};
use log::{debug, error};
use reqwest::{RequestBuilder, StatusCode, header};
use serde::Serialize;

use crate::error::ClientError;
use crate::session::{SessionState, StreamSession};
use crate::settings::EmbedSettings;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one embed.
///
/// Streams have no timeout of their own; cancel them through
/// [`StreamSession::cancel_handle`]. History and feedback calls use the
/// request timeout.
#[derive(Debug, Clone)]
pub struct EmbedClient {
    http: reqwest::Client,
    settings: EmbedSettings,
    request_timeout: Duration,
}

impl EmbedClient {
    pub fn new(settings: EmbedSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            settings,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &EmbedSettings {
        &self.settings
    }

    /// The `stream-chat` request for `message`.
    pub fn chat_request(&self, session_id: &str, message: &str) -> Result<RequestBuilder, ClientError> {
        let body = encode_request(
            message,
            session_id,
            self.settings.username.as_deref(),
            &self.settings.overrides(),
        )?;

        Ok(self
            .http
            .post(format!("{}/stream-chat", self.settings.embed_url()))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .body(body))
    }

    /// Stream one exchange on a fresh session.
    pub async fn stream_chat<F>(
        &self,
        session_id: &str,
        message: &str,
        on_event: F,
    ) -> Result<SessionState, ClientError>
    where
        F: FnMut(StreamEvent),
    {
        let mut session = StreamSession::new();
        self.stream_session(&mut session, session_id, message, on_event)
            .await
    }

    /// Stream one exchange on a caller-owned session, so its cancel handle can
    /// be taken beforehand.
    pub async fn stream_session<F>(
        &self,
        session: &mut StreamSession,
        session_id: &str,
        message: &str,
        on_event: F,
    ) -> Result<SessionState, ClientError>
    where
        F: FnMut(StreamEvent),
    {
        let request = self.chat_request(session_id, message)?;
        Ok(session.run(request, on_event).await?)
    }

    /// Past turns of a session. Failures are logged and yield no turns.
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        match self.fetch_history(session_id).await {
            Ok(history) => history,
            Err(e) => {
                error!("failed to fetch history for session {}: {}", session_id, e);
                Vec::new()
            }
        }
    }

    async fn fetch_history(&self, session_id: &str) -> Result<Vec<ChatTurn>, ClientError> {
        let response = self
            .http
            .get(self.session_url(session_id))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: HistoryResponse = response.json().await?;
        Ok(body.history)
    }

    /// Hide the session's past turns. Returns whether the server confirmed.
    pub async fn reset(&self, session_id: &str) -> bool {
        let result = self
            .http
            .delete(self.session_url(session_id))
            .timeout(self.request_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                error!("reset of session {} failed: {}", session_id, response.status());
                false
            }
            Err(e) => {
                error!("reset of session {} failed: {}", session_id, e);
                false
            }
        }
    }

    /// Set (`Some`) or clear (`None`) the score of a turn.
    pub async fn update_feedback(
        &self,
        session_id: &str,
        chat_id: i64,
        feedback: Option<bool>,
    ) -> Result<FeedbackResponse, ClientError> {
        let url = format!("{}/chat-feedback/{}", self.session_url(session_id), chat_id);
        self.post_feedback(&url, chat_id, &FeedbackRequest { feedback })
            .await
    }

    /// Set or clear the comment of a turn.
    pub async fn update_comment(
        &self,
        session_id: &str,
        chat_id: i64,
        comment: Option<String>,
    ) -> Result<FeedbackResponse, ClientError> {
        let url = format!(
            "{}/chat-feedback/{}/comment",
            self.session_url(session_id),
            chat_id
        );
        self.post_feedback(&url, chat_id, &CommentRequest { comment })
            .await
    }

    async fn post_feedback<B: Serialize>(
        &self,
        url: &str,
        chat_id: i64,
        body: &B,
    ) -> Result<FeedbackResponse, ClientError> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { chat_id });
        }
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Session ids are opaque, so they travel as one escaped path segment.
    fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/{}",
            self.settings.embed_url(),
            urlencoding::encode(session_id)
        )
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
