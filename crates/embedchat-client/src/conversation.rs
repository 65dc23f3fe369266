use embedchat_protocol::{ChatTurn, StreamEvent, TurnId};

/// Ordered turns of one widget view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn turn(&self, id: &TurnId) -> Option<&ChatTurn> {
        self.turns.iter().find(|turn| &turn.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append the user's message and an empty system turn for the reply.
    /// Returns the id of the pending system turn.
    pub fn submit(&mut self, message: impl Into<String>) -> TurnId {
        let mut user = ChatTurn::user(message);
        user.close = true;
        self.turns.push(user);

        let pending = ChatTurn::pending();
        let id = pending.id;
        self.turns.push(pending);
        id
    }

    /// Apply a stream event to the pending turn. Returns `false` when the
    /// turn is unknown or already closed.
    pub fn apply(&mut self, pending: &TurnId, event: &StreamEvent) -> bool {
        let Some(turn) = self.turns.iter_mut().find(|turn| &turn.id == pending) else {
            return false;
        };
        if turn.close {
            return false;
        }

        let streamed = turn
            .text_response
            .as_deref()
            .is_some_and(|text| !text.is_empty());

        match event {
            StreamEvent::Content(frame) => {
                if let Some(text) = &frame.text_response {
                    turn.text_response
                        .get_or_insert_with(String::new)
                        .push_str(text);
                }
                if let Some(sources) = frame.sources.as_ref().filter(|s| !s.is_empty()) {
                    turn.sources
                        .get_or_insert_with(Vec::new)
                        .extend(sources.iter().cloned());
                }
            }
            StreamEvent::Finished(frame) => {
                if !streamed && frame.text_response.is_some() {
                    turn.text_response = frame.text_response.clone();
                }
                if let Some(sources) = &frame.sources {
                    turn.sources = Some(sources.clone());
                }
                turn.chat_id = frame.chat_id;
                turn.error = frame.error.clone();
                turn.close = true;
            }
            StreamEvent::Abort(frame) => {
                if !streamed {
                    turn.text_response = frame.text_response.clone();
                }
                turn.error = frame.error.clone();
                turn.close = true;
            }
        }
        true
    }

    /// Load a fetched history in place of the current view.
    pub fn replace(&mut self, history: Vec<ChatTurn>) {
        self.turns = history;
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
