//! Wire types for the embed chat streaming protocol.
//!
//! Shared by the server (which emits stream events and history) and the
//! widget client (which encodes chat requests and decodes stream frames).
//!
//! ## Streaming
//!
//! A chat turn is one `POST /embed/{embedId}/stream-chat` request answered by
//! a `text/event-stream` response. Every SSE `data` field carries one JSON
//! [`StreamEvent`]. Exactly one terminal event (`close: true`) ends the turn.

pub mod codec;
pub mod events;
pub mod identity;
pub mod turns;

pub use codec::{ChatRequest, DecodeError, Overrides, decode_error_body, decode_event, encode_request};
pub use events::{AbortFrame, ContentFrame, FinishFrame, FrameKind, Source, StreamEvent};
pub use identity::TurnId;
pub use turns::{
    ChatTurn, CommentRequest, FeedbackRequest, FeedbackResponse, HistoryResponse, Sender,
};
