//! Client side of the embed chat protocol.
//!
//! [`StreamSession`] drives one streamed exchange as an explicit state
//! machine, [`Conversation`] applies the resulting events to a widget view,
//! and [`EmbedClient`] wraps the request/response endpoints around them.

mod client;
mod conversation;
mod error;
mod session;
mod settings;

pub use client::EmbedClient;
pub use conversation::Conversation;
pub use error::{ClientError, SessionError, StreamError};
pub use session::{SessionState, StreamSession};
pub use settings::EmbedSettings;

pub use embedchat_protocol as protocol;
pub use tokio_util::sync::CancellationToken;
