//! API integration tests.

use axum::http::{Method, StatusCode, header};
use embedchat::assistant::ScriptedAssistant;
use embedchat::chats::ChatStore;
use embedchat::embed::CreateEmbed;
use embedchat_protocol::decode_error_body;
use serde_json::json;

mod common;
use common::{test_app, test_app_with};

fn stream_uri(embed_uuid: &str) -> String {
    format!("/embed/{embed_uuid}/stream-chat")
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;
    let response = app.send(Method::GET, "/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let json = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let app = test_app().await;
    app.database.close().await;

    let response = app.send(Method::GET, "/health", None).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json()["status"], "degraded");
}

#[tokio::test]
async fn test_stream_chat_emits_chunks_then_close() {
    let app = test_app().await;
    let response = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"message": "hello", "sessionId": "s1"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let header = |name: &str| {
        response
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    assert!(header("content-type").starts_with("text/event-stream"));
    assert_eq!(header("cache-control"), "no-cache");
    assert_eq!(header("x-accel-buffering"), "no");
    assert_eq!(header("access-control-allow-origin"), "*");

    let events = response.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].text_response(), Some("Hi"));
    assert_eq!(events[1].text_response(), Some(" there"));
    assert!(!events[0].is_terminal());

    let last = &events[2];
    assert!(last.is_terminal());
    assert!(!last.is_abort());
    assert_eq!(last.sources().map(<[_]>::len), Some(1));

    let chat_id = last.chat_id().unwrap();
    let record = app.store.get(&app.scope("s1"), chat_id).await.unwrap().unwrap();
    assert_eq!(record.prompt, "hello");
    assert_eq!(record.response.text_response, "Hi there");
}

#[tokio::test]
async fn test_stream_chat_applies_non_null_overrides_only() {
    let app = test_app_with(
        ScriptedAssistant::echo(),
        CreateEmbed {
            prompt: Some("Embed prompt".to_string()),
            temperature: Some(0.2),
            ..Default::default()
        },
    )
    .await;

    app.send(
        Method::POST,
        &stream_uri(&app.embed.uuid),
        Some(json!({
            "message": "hi",
            "sessionId": "s1",
            "username": null,
            "prompt": null,
            "model": "override-model",
            "temperature": null
        })),
    )
    .await;

    let request = app.assistant.last_request().await.unwrap();
    assert_eq!(request.settings.prompt.as_deref(), Some("Embed prompt"));
    assert_eq!(request.settings.model, "override-model");
    assert_eq!(request.settings.temperature, Some(0.2));
}

#[tokio::test]
async fn test_stream_chat_unknown_embed_is_abort_body() {
    let app = test_app().await;
    let response = app
        .send(
            Method::POST,
            &stream_uri("no-such-embed"),
            Some(json!({"message": "hello", "sessionId": "s1"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let event = decode_error_body(&response.body).unwrap();
    assert!(event.is_abort());
    assert!(event.error().is_some());
}

#[tokio::test]
async fn test_stream_chat_disabled_embed_is_forbidden() {
    let app = test_app().await;
    app.embeds.set_enabled(&app.embed.uuid, false).await.unwrap();

    let response = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"message": "hello", "sessionId": "s1"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(decode_error_body(&response.body).unwrap().is_abort());
}

#[tokio::test]
async fn test_stream_chat_rejects_empty_and_malformed_bodies() {
    let app = test_app().await;

    let empty = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"message": "  ", "sessionId": "s1"})),
        )
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert!(decode_error_body(&empty.body).unwrap().is_abort());

    let malformed = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"sessionId": "s1"})),
        )
        .await;
    assert!(malformed.status.is_client_error());
    assert!(decode_error_body(&malformed.body).unwrap().is_abort());
}

#[tokio::test]
async fn test_stream_chat_session_cap() {
    let app = test_app_with(
        ScriptedAssistant::echo(),
        CreateEmbed {
            max_chats_per_session: Some(1),
            ..Default::default()
        },
    )
    .await;
    app.seed("s1", "earlier", "answer").await;

    let response = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"message": "again", "sessionId": "s1"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Other sessions are unaffected.
    let response = app
        .send(
            Method::POST,
            &stream_uri(&app.embed.uuid),
            Some(json!({"message": "fresh", "sessionId": "s2"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_history_is_redacted_and_ignores_query() {
    let app = test_app().await;
    let record = app.seed("s1", "What is the refund policy?", "30 days.").await;

    for uri in [
        format!("/embed/{}/s1", app.embed.uuid),
        format!("/embed/{}/s1?includeSources=true&sources=1", app.embed.uuid),
    ] {
        let response = app.send(Method::GET, &uri, None).await;
        assert_eq!(response.status, StatusCode::OK);

        let json = response.json();
        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["sender"], "user");
        assert_eq!(history[0]["textResponse"], "What is the refund policy?");
        assert_eq!(history[1]["sender"], "system");
        assert_eq!(history[1]["textResponse"], "30 days.");
        assert_eq!(history[1]["chatId"], record.id);
        for turn in history {
            assert!(turn.get("sources").is_none());
        }
    }
}

#[tokio::test]
async fn test_history_is_scoped_to_session() {
    let app = test_app().await;
    app.seed("s1", "mine", "answer").await;

    let response = app
        .send(Method::GET, &format!("/embed/{}/s2", app.embed.uuid), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"history": []}));
}

#[tokio::test]
async fn test_reset_twice_leaves_empty_history() {
    let app = test_app().await;
    app.seed("s1", "one", "1").await;
    app.seed("s1", "two", "2").await;
    let uri = format!("/embed/{}/s1", app.embed.uuid);

    for _ in 0..2 {
        let response = app.send(Method::DELETE, &uri, None).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let response = app.send(Method::GET, &uri, None).await;
    assert_eq!(response.json(), json!({"history": []}));
}

#[tokio::test]
async fn test_feedback_round_trip() {
    let app = test_app().await;
    let record = app.seed("s1", "q", "a").await;
    let uri = format!("/embed/{}/s1/chat-feedback/{}", app.embed.uuid, record.id);

    let response = app
        .send(Method::POST, &uri, Some(json!({"feedback": true})))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"success": true}));
    let stored = app.store.get(&app.scope("s1"), record.id).await.unwrap().unwrap();
    assert_eq!(stored.feedback_score, Some(true));

    app.send(Method::POST, &uri, Some(json!({"feedback": null})))
        .await;
    let stored = app.store.get(&app.scope("s1"), record.id).await.unwrap().unwrap();
    assert_eq!(stored.feedback_score, None);
}

#[tokio::test]
async fn test_feedback_from_other_session_is_not_found() {
    let app = test_app().await;
    let record = app.seed("s1", "q", "a").await;
    let uri = format!("/embed/{}/s2/chat-feedback/{}", app.embed.uuid, record.id);

    let response = app
        .send(Method::POST, &uri, Some(json!({"feedback": false})))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let json = response.json();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Chat not found");

    let stored = app.store.get(&app.scope("s1"), record.id).await.unwrap().unwrap();
    assert_eq!(stored.feedback_score, None);
}

#[tokio::test]
async fn test_comment_normalization() {
    let app = test_app().await;
    let record = app.seed("s1", "q", "a").await;
    let uri = format!(
        "/embed/{}/s1/chat-feedback/{}/comment",
        app.embed.uuid, record.id
    );

    let response = app
        .send(Method::POST, &uri, Some(json!({"comment": "  missed the point  "})))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let stored = app.store.get(&app.scope("s1"), record.id).await.unwrap().unwrap();
    assert_eq!(stored.feedback_comment.as_deref(), Some("missed the point"));

    app.send(Method::POST, &uri, Some(json!({"comment": "   "})))
        .await;
    let stored = app.store.get(&app.scope("s1"), record.id).await.unwrap().unwrap();
    assert_eq!(stored.feedback_comment, None);
}

#[tokio::test]
async fn test_non_numeric_chat_id_is_not_found() {
    let app = test_app().await;
    let uri = format!("/embed/{}/s1/chat-feedback/abc", app.embed.uuid);

    let response = app
        .send(Method::POST, &uri, Some(json!({"feedback": true})))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(stream_uri(&app.embed.uuid))
                .method(Method::OPTIONS)
                .header(header::ORIGIN, "https://customer.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
