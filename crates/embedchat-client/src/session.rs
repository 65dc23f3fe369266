//! One streamed chat exchange.

use embedchat_protocol::{StreamEvent, decode_error_body, decode_event};
use futures::StreamExt;
use log::{debug, warn};
use reqwest::RequestBuilder;
use reqwest_eventsource::{Event, EventSource};
use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, StreamError};

/// Lifecycle of a [`StreamSession`].
///
/// `Idle -> Opening -> Streaming -> Closed`, with `Aborted` reachable from
/// `Opening` and `Streaming`. `Closed` and `Aborted` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Streaming,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }

    fn can_become(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Opening)
                | (Self::Opening, Self::Streaming)
                | (Self::Opening, Self::Aborted)
                | (Self::Streaming, Self::Closed)
                | (Self::Streaming, Self::Aborted)
        )
    }
}

/// Closes the event source on every exit path.
struct Transport(EventSource);

impl Drop for Transport {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Owns the state of one streamed exchange.
///
/// The session never retries; a failed exchange ends `Aborted` after a
/// single synthesized abort event. Cancellation through
/// [`cancel_handle`](Self::cancel_handle) ends it `Aborted` without any
/// further event.
#[derive(Debug)]
pub struct StreamSession {
    state: SessionState,
    cancel: CancellationToken,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that cancels this exchange. Safe to trigger in any state.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_become(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("stream session {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Run the exchange for `request`, calling `on_event` for every event in
    /// arrival order. Returns the final state.
    pub async fn run<F>(
        &mut self,
        request: RequestBuilder,
        mut on_event: F,
    ) -> Result<SessionState, SessionError>
    where
        F: FnMut(StreamEvent),
    {
        self.transition(SessionState::Opening)?;
        if self.cancel.is_cancelled() {
            self.transition(SessionState::Aborted)?;
            return Ok(self.state);
        }

        let mut transport = match EventSource::new(request) {
            Ok(mut es) => {
                es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));
                Transport(es)
            }
            Err(e) => {
                return self.fail(StreamError::Transport(e.to_string()), &mut on_event);
            }
        };

        let cancel = self.cancel.clone();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("stream session cancelled");
                    self.transition(SessionState::Aborted)?;
                    return Ok(self.state);
                }
                next = transport.0.next() => next,
            };

            match next {
                Some(Ok(Event::Open)) => self.transition(SessionState::Streaming)?,
                Some(Ok(Event::Message(message))) => {
                    if self.state == SessionState::Opening {
                        self.transition(SessionState::Streaming)?;
                    }
                    let event = match decode_event(&message.data) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("dropping undecodable stream frame: {}", e);
                            continue;
                        }
                    };

                    let terminal = event.is_terminal();
                    let next_state = if event.is_abort() {
                        SessionState::Aborted
                    } else {
                        SessionState::Closed
                    };
                    on_event(event);
                    if terminal {
                        self.transition(next_state)?;
                        return Ok(self.state);
                    }
                }
                None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                    let error = StreamError::Transport("Stream ended unexpectedly.".to_string());
                    return self.fail(error, &mut on_event);
                }
                Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                    let error = if status.as_u16() >= 400 {
                        let body = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                self.transition(SessionState::Aborted)?;
                                return Ok(self.state);
                            }
                            body = response.bytes() => body,
                        };
                        StreamError::Application {
                            status: status.as_u16(),
                            body: body.ok().and_then(|body| decode_error_body(&body).ok()),
                        }
                    } else {
                        StreamError::Unexpected
                    };
                    return self.fail(error, &mut on_event);
                }
                Some(Err(reqwest_eventsource::Error::InvalidContentType(..))) => {
                    return self.fail(StreamError::Unexpected, &mut on_event);
                }
                Some(Err(e)) => {
                    return self.fail(StreamError::Transport(e.to_string()), &mut on_event);
                }
            }
        }
    }

    /// Deliver the abort for `error` and end the session.
    fn fail<F>(&mut self, error: StreamError, on_event: &mut F) -> Result<SessionState, SessionError>
    where
        F: FnMut(StreamEvent),
    {
        warn!("stream session failed: {}", error);
        on_event(error.into_abort());
        self.transition(SessionState::Aborted)?;
        Ok(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use SessionState::*;

        assert!(Idle.can_become(Opening));
        assert!(Opening.can_become(Streaming));
        assert!(Opening.can_become(Aborted));
        assert!(Streaming.can_become(Closed));
        assert!(Streaming.can_become(Aborted));

        assert!(!Idle.can_become(Streaming));
        assert!(!Idle.can_become(Closed));
        assert!(!Opening.can_become(Closed));
        assert!(!Closed.can_become(Aborted));
        assert!(!Aborted.can_become(Opening));
        assert!(!Closed.can_become(Opening));
    }

    #[test]
    fn test_transition_rejects_illegal_moves() {
        let mut session = StreamSession::new();
        let err = session.transition(SessionState::Closed).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Idle,
                to: SessionState::Closed
            }
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_before_run_is_silent() {
        let mut session = StreamSession::new();
        session.cancel_handle().cancel();

        let request = reqwest::Client::new().post("http://127.0.0.1:9/never");
        let mut delivered = 0;
        let state = session.run(request, |_| delivered += 1).await.unwrap();

        assert_eq!(state, SessionState::Aborted);
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let mut session = StreamSession::new();
        session.cancel_handle().cancel();
        let client = reqwest::Client::new();

        session
            .run(client.post("http://127.0.0.1:9/never"), |_| {})
            .await
            .unwrap();
        let err = session
            .run(client.post("http://127.0.0.1:9/never"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }
}
