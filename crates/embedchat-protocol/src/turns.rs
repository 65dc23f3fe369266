//! Conversation turns and the request/response bodies around them.

use serde::{Deserialize, Serialize};

use crate::events::Source;
use crate::identity::TurnId;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    System,
}

/// One client-visible turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: TurnId,
    pub sender: Sender,
    pub text_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Storage id of the record this turn came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_score: Option<bool>,
}

impl ChatTurn {
    fn new(sender: Sender, text: Option<String>) -> Self {
        Self {
            id: TurnId::new(),
            sender,
            text_response: text,
            sources: None,
            close: false,
            error: None,
            chat_id: None,
            sent_at: None,
            feedback_score: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, Some(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, Some(text.into()))
    }

    /// An empty system turn waiting for stream events.
    pub fn pending() -> Self {
        Self::new(Sender::System, None)
    }

    pub fn is_system(&self) -> bool {
        self.sender == Sender::System
    }
}

/// Body of `GET /embed/{embedId}/{sessionId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<ChatTurn>,
}

/// Body of `POST .../chat-feedback/{chatId}`. `null` clears the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub feedback: Option<bool>,
}

/// Body of `POST .../chat-feedback/{chatId}/comment`. `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub comment: Option<String>,
}

/// Response of both feedback endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeedbackResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_wire_shape() {
        let mut turn = ChatTurn::system("Hello");
        turn.chat_id = Some(3);
        let value = serde_json::to_value(&turn).unwrap();

        assert_eq!(value["sender"], "system");
        assert_eq!(value["textResponse"], "Hello");
        assert_eq!(value["chatId"], 3);
        assert_eq!(value["close"], false);
        assert!(value.get("sources").is_none());
    }

    #[test]
    fn test_feedback_request_accepts_null_and_missing() {
        let cleared: FeedbackRequest = serde_json::from_value(json!({"feedback": null})).unwrap();
        assert_eq!(cleared.feedback, None);

        let missing: FeedbackRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.feedback, None);

        let negative: FeedbackRequest = serde_json::from_value(json!({"feedback": false})).unwrap();
        assert_eq!(negative.feedback, Some(false));
    }

    #[test]
    fn test_pending_turn_is_empty_system_turn() {
        let turn = ChatTurn::pending();
        assert!(turn.is_system());
        assert!(turn.text_response.is_none());
        assert!(!turn.close);
    }
}
