//! Test utilities and common setup.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use embedchat::api;
use embedchat::assistant::ScriptedAssistant;
use embedchat::chats::{ChatRecord, ChatStore, NewChat, SessionScope, SqliteChatStore, StoredResponse};
use embedchat::db::Database;
use embedchat::embed::{CreateEmbed, EmbedConfig, EmbedRepository};
use embedchat::telemetry::NoopTelemetry;
use embedchat_protocol::{Source, StreamEvent, decode_event};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub database: Database,
    pub embed: EmbedConfig,
    pub embeds: EmbedRepository,
    pub store: SqliteChatStore,
    pub assistant: ScriptedAssistant,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// Decode a `text/event-stream` body into its events.
    pub fn events(&self) -> Vec<StreamEvent> {
        let text = std::str::from_utf8(&self.body).unwrap();
        text.split("\n\n")
            .filter_map(|block| {
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(|data| data.strip_prefix(' ').unwrap_or(data))
                    .collect();
                if data.is_empty() {
                    None
                } else {
                    Some(decode_event(&data.join("\n")).unwrap())
                }
            })
            .collect()
    }
}

/// App with a scripted assistant answering "Hi there" with one source.
pub async fn test_app() -> TestApp {
    let assistant =
        ScriptedAssistant::chunks(["Hi", " there"]).with_sources(vec![Source::titled("faq.md")]);
    test_app_with(assistant, CreateEmbed::default()).await
}

pub async fn test_app_with(assistant: ScriptedAssistant, mut embed: CreateEmbed) -> TestApp {
    if embed.workspace.is_empty() {
        embed.workspace = "support".to_string();
    }

    let database = Database::in_memory().await.unwrap();
    let embeds = EmbedRepository::new(database.pool().clone());
    let embed = embeds.create(embed).await.unwrap();

    let state = embedchat::build_state(
        &database,
        Arc::new(assistant.clone()),
        Arc::new(NoopTelemetry),
        "test-model",
    );

    TestApp {
        router: api::create_router(state),
        store: SqliteChatStore::new(database.pool().clone()),
        database,
        embed,
        embeds,
        assistant,
    }
}

impl TestApp {
    pub fn scope(&self, session_id: &str) -> SessionScope {
        SessionScope::new(self.embed.id, session_id)
    }

    /// Store an exchange directly, bypassing the stream endpoint.
    pub async fn seed(&self, session_id: &str, prompt: &str, answer: &str) -> ChatRecord {
        self.store
            .create(NewChat {
                scope: self.scope(session_id),
                prompt: prompt.to_string(),
                response: StoredResponse::new(answer, vec![Source::titled("internal.pdf")]),
                username: None,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut request = Request::builder().uri(uri).method(method);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
