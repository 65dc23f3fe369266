//! OpenAI-compatible chat completions backend.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{Assistant, AssistantDelta, AssistantError, AssistantRequest, DeltaStream};

const DONE_SENTINEL: &str = "[DONE]";

/// Streams replies from `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAssistant {
    pub fn new(base_url: &str, api_key: Option<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Text carried by one completion chunk, if any.
fn chunk_text(data: &str) -> Option<String> {
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty()),
        Err(e) => {
            warn!("Skipping unparseable completion chunk: {}", e);
            None
        }
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn respond(&self, request: AssistantRequest) -> Result<DeltaStream, AssistantError> {
        let mut body = json!({
            "model": request.settings.model,
            "stream": true,
            "messages": request.messages(),
        });
        if let Some(temperature) = request.settings.temperature {
            body["temperature"] = json!(temperature);
        }

        debug!(model = %request.settings.model, "Requesting completion stream");

        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let mut es =
            EventSource::new(builder).map_err(|e| AssistantError::Request(e.to_string()))?;
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let stream = futures::stream::unfold(Some(es), |state| async move {
            let mut es = state?;
            loop {
                match es.next().await {
                    None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => {
                        if msg.data.trim() == DONE_SENTINEL {
                            es.close();
                            return None;
                        }
                        if let Some(text) = chunk_text(&msg.data) {
                            return Some((Ok(AssistantDelta::Text(text)), Some(es)));
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                        es.close();
                        let message = response.text().await.unwrap_or_default();
                        let err = AssistantError::Upstream {
                            status: status.as_u16(),
                            message,
                        };
                        return Some((Err(err), None));
                    }
                    Some(Err(e)) => {
                        es.close();
                        return Some((Err(AssistantError::Stream(e.to_string())), None));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(chunk_text(data).as_deref(), Some("Hel"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(chunk_text(role_only), None);

        assert_eq!(chunk_text(r#"{"choices":[]}"#), None);
        assert_eq!(chunk_text("not json"), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let assistant =
            OpenAiAssistant::new("http://localhost:11434/v1/", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            assistant.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let assistant =
            OpenAiAssistant::new("http://x", Some(String::new()), Duration::from_secs(5)).unwrap();
        assert!(assistant.api_key.is_none());
    }
}
