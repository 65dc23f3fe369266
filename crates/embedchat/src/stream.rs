//! Server side of a streamed chat turn.
//!
//! A turn is checked up front (message, session cap), then answered on a
//! spawned task that forwards assistant deltas as stream events over a
//! bounded channel. The response body reads from the other end. When the
//! client goes away the channel closes and the task stops without persisting.

use std::sync::Arc;

use dashmap::DashMap;
use embedchat_protocol::{ChatRequest, StreamEvent};
use futures::StreamExt;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::assistant::{Assistant, AssistantDelta, AssistantRequest};
use crate::chats::{ChatStore, NewChat, SessionScope, StoreError, StoredResponse};
use crate::embed::ResolvedEmbed;
use crate::telemetry::{TelemetryEvent, TelemetrySink, emit_detached};

const CHANNEL_CAPACITY: usize = 32;

/// Reasons a turn is refused before any event is streamed.
#[derive(Debug, Error)]
pub enum StreamRejection {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Session has reached its limit of {limit} chats")]
    SessionLimit { limit: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Prefix of every abort message sent to widgets.
pub fn abort_message(details: impl std::fmt::Display) -> String {
    format!("An error occurred while streaming response. {details}")
}

/// Turns of capped sessions that were accepted but are not stored yet.
type InFlight = Arc<DashMap<SessionScope, i64>>;

/// One accepted turn counted against its session cap until `run` ends.
struct TurnReservation {
    in_flight: InFlight,
    scope: SessionScope,
}

impl TurnReservation {
    /// Take a slot and return it with the number of slots now held.
    fn acquire(in_flight: &InFlight, scope: &SessionScope) -> (Self, i64) {
        let held = {
            let mut slot = in_flight.entry(scope.clone()).or_insert(0);
            *slot += 1;
            *slot
        };
        let reservation = Self {
            in_flight: in_flight.clone(),
            scope: scope.clone(),
        };
        (reservation, held)
    }
}

impl Drop for TurnReservation {
    fn drop(&mut self) {
        self.in_flight.alter(&self.scope, |_, held| held - 1);
        self.in_flight.remove_if(&self.scope, |_, held| *held <= 0);
    }
}

#[derive(Clone)]
pub struct ChatPipeline {
    store: Arc<dyn ChatStore>,
    assistant: Arc<dyn Assistant>,
    telemetry: Arc<dyn TelemetrySink>,
    default_model: String,
    in_flight: InFlight,
}

impl ChatPipeline {
    pub fn new(
        store: Arc<dyn ChatStore>,
        assistant: Arc<dyn Assistant>,
        telemetry: Arc<dyn TelemetrySink>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            assistant,
            telemetry,
            default_model: default_model.into(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Validate the turn and start streaming it.
    pub async fn start(
        &self,
        embed: ResolvedEmbed,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, StreamRejection> {
        if request.message.trim().is_empty() {
            return Err(StreamRejection::EmptyMessage);
        }

        let scope = SessionScope::new(embed.id, request.session_id.clone());
        // Stored rows plus turns still streaming, this one included.
        let reservation = match embed.max_chats_per_session {
            Some(limit) => {
                let (reservation, held) = TurnReservation::acquire(&self.in_flight, &scope);
                let stored = self.store.count(&scope).await?;
                if stored + held > limit {
                    return Err(StreamRejection::SessionLimit { limit });
                }
                Some(reservation)
            }
            None => None,
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let span = info_span!("stream_chat", embed = %embed.uuid, session_id = %scope.session_id);
        let pipeline = self.clone();
        tokio::spawn(
            async move {
                pipeline.run(embed, scope, request, tx).await;
                drop(reservation);
            }
            .instrument(span),
        );

        Ok(rx)
    }

    async fn run(
        self,
        embed: ResolvedEmbed,
        scope: SessionScope,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let response_id = Uuid::new_v4().to_string();
        let settings = embed.settings(&request.overrides(), &self.default_model);

        let records = match self.store.list(&scope, Some(embed.history_window)).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load context history, continuing without it: {}", e);
                Vec::new()
            }
        };

        let assistant_request =
            AssistantRequest::new(&embed.workspace, settings.clone(), &records, &request.message);

        let mut deltas = match self.assistant.respond(assistant_request).await {
            Ok(deltas) => deltas,
            Err(e) => {
                error!("Assistant request failed: {}", e);
                let _ = tx
                    .send(StreamEvent::abort(Some(response_id), abort_message(e)))
                    .await;
                return;
            }
        };

        let mut text = String::new();
        let mut sources = Vec::new();

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(AssistantDelta::Text(chunk)) => {
                    text.push_str(&chunk);
                    if tx
                        .send(StreamEvent::chunk(response_id.clone(), chunk))
                        .await
                        .is_err()
                    {
                        debug!("Client disconnected, dropping turn");
                        return;
                    }
                }
                Ok(AssistantDelta::Sources(more)) => sources.extend(more),
                Err(e) => {
                    error!("Assistant stream failed: {}", e);
                    let _ = tx
                        .send(StreamEvent::abort(Some(response_id), abort_message(e)))
                        .await;
                    return;
                }
            }
        }

        let chat = NewChat {
            scope: scope.clone(),
            prompt: request.message.clone(),
            response: StoredResponse::new(text, sources.clone()),
            username: request.username.clone(),
        };
        let chat_id = match self.store.create(chat).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                error!("Failed to persist embed chat: {}", e);
                None
            }
        };

        if tx
            .send(StreamEvent::finalize(response_id, chat_id, sources))
            .await
            .is_err()
        {
            debug!("Client disconnected before the final frame");
        }

        if chat_id.is_some() {
            emit_detached(
                self.telemetry.clone(),
                TelemetryEvent::new(
                    "embed_sent_chat",
                    json!({
                        "embedId": embed.uuid,
                        "workspace": embed.workspace,
                        "model": settings.model,
                        "multiUserMode": false,
                    }),
                ),
            );
        }
    }
}
