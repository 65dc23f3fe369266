//! Stream event types.
//!
//! On the wire an event is a loosely shaped JSON object. In Rust it is a
//! closed enum: [`StreamEvent::Content`] never ends a turn,
//! [`StreamEvent::Finished`] and [`StreamEvent::Abort`] always do.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Sources
// ============================================================================

/// A document reference attached to an assistant response.
///
/// Only a few keys are interpreted; everything else is carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Source {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Frame kinds
// ============================================================================

/// Content frame type as carried in the `type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameKind {
    /// No (or an unrecognized) `type` field.
    #[default]
    Unspecified,
    /// Incremental piece of the response text.
    TextResponseChunk,
    /// Whole response delivered in one frame.
    TextResponse,
    /// Terminal frame of a successful stream.
    FinalizeResponseStream,
}

impl FrameKind {
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::TextResponseChunk => Some("textResponseChunk"),
            Self::TextResponse => Some("textResponse"),
            Self::FinalizeResponseStream => Some("finalizeResponseStream"),
        }
    }

    fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("textResponseChunk") => Self::TextResponseChunk,
            Some("textResponse") => Self::TextResponse,
            Some("finalizeResponseStream") => Self::FinalizeResponseStream,
            _ => Self::Unspecified,
        }
    }
}

const ABORT_TYPE: &str = "abort";

// ============================================================================
// Events
// ============================================================================

/// Non-terminal frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentFrame {
    pub id: Option<String>,
    pub kind: FrameKind,
    pub text_response: Option<String>,
    pub sources: Option<Vec<Source>>,
}

/// Terminal frame of a stream that completed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishFrame {
    pub id: Option<String>,
    pub kind: FrameKind,
    pub text_response: Option<String>,
    pub sources: Option<Vec<Source>>,
    /// Storage id of the persisted record, used to address feedback.
    pub chat_id: Option<i64>,
    pub error: Option<String>,
}

/// Terminal frame of a stream that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbortFrame {
    pub id: Option<String>,
    pub text_response: Option<String>,
    pub sources: Option<Vec<Source>>,
    pub error: Option<String>,
}

/// One event of a chat stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub enum StreamEvent {
    Content(ContentFrame),
    Finished(FinishFrame),
    Abort(AbortFrame),
}

impl StreamEvent {
    /// A partial response chunk.
    pub fn chunk(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Content(ContentFrame {
            id: Some(id.into()),
            kind: FrameKind::TextResponseChunk,
            text_response: Some(text.into()),
            sources: Some(Vec::new()),
        })
    }

    /// The closing frame of a successful stream.
    pub fn finalize(id: impl Into<String>, chat_id: Option<i64>, sources: Vec<Source>) -> Self {
        Self::Finished(FinishFrame {
            id: Some(id.into()),
            kind: FrameKind::FinalizeResponseStream,
            text_response: None,
            sources: Some(sources),
            chat_id,
            error: None,
        })
    }

    /// A terminal failure frame.
    pub fn abort(id: Option<String>, error: impl Into<String>) -> Self {
        Self::Abort(AbortFrame {
            id,
            text_response: None,
            sources: Some(Vec::new()),
            error: Some(error.into()),
        })
    }

    /// Whether this event ends the stream (`close: true` on the wire).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Content(_))
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Content(f) => f.id.as_deref(),
            Self::Finished(f) => f.id.as_deref(),
            Self::Abort(f) => f.id.as_deref(),
        }
    }

    pub fn text_response(&self) -> Option<&str> {
        match self {
            Self::Content(f) => f.text_response.as_deref(),
            Self::Finished(f) => f.text_response.as_deref(),
            Self::Abort(f) => f.text_response.as_deref(),
        }
    }

    pub fn sources(&self) -> Option<&[Source]> {
        match self {
            Self::Content(f) => f.sources.as_deref(),
            Self::Finished(f) => f.sources.as_deref(),
            Self::Abort(f) => f.sources.as_deref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Content(_) => None,
            Self::Finished(f) => f.error.as_deref(),
            Self::Abort(f) => f.error.as_deref(),
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::Finished(f) => f.chat_id,
            _ => None,
        }
    }
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub close: bool,
    #[serde(default, deserialize_with = "lenient_error")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
}

/// Servers send `error: false` on healthy frames; only a non-empty string
/// counts as an error.
fn lenient_error<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

impl From<RawEvent> for StreamEvent {
    fn from(raw: RawEvent) -> Self {
        if raw.kind.as_deref() == Some(ABORT_TYPE) {
            return Self::Abort(AbortFrame {
                id: raw.id,
                text_response: raw.text_response,
                sources: raw.sources,
                error: raw.error,
            });
        }

        let kind = FrameKind::from_wire(raw.kind.as_deref());
        if raw.close {
            Self::Finished(FinishFrame {
                id: raw.id,
                kind,
                text_response: raw.text_response,
                sources: raw.sources,
                chat_id: raw.chat_id,
                error: raw.error,
            })
        } else {
            Self::Content(ContentFrame {
                id: raw.id,
                kind,
                text_response: raw.text_response,
                sources: raw.sources,
            })
        }
    }
}

impl From<StreamEvent> for RawEvent {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Content(f) => RawEvent {
                id: f.id,
                kind: f.kind.as_wire().map(str::to_string),
                text_response: f.text_response,
                sources: f.sources,
                close: false,
                error: None,
                chat_id: None,
            },
            StreamEvent::Finished(f) => RawEvent {
                id: f.id,
                kind: f.kind.as_wire().map(str::to_string),
                text_response: f.text_response,
                sources: f.sources,
                close: true,
                error: f.error,
                chat_id: f.chat_id,
            },
            StreamEvent::Abort(f) => RawEvent {
                id: f.id,
                kind: Some(ABORT_TYPE.to_string()),
                text_response: f.text_response,
                sources: f.sources,
                close: true,
                error: f.error,
                chat_id: None,
            },
        }
    }
}
