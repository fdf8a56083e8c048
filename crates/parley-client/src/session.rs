use crate::reconstructor::{TurnOutcome, TurnProgress};
use parley_contract::{gen_message_id, Message, Role};
use parley_protocol_data_stream::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    /// Request sent, no frame received yet.
    Submitted,
    Streaming,
    Ready,
    Error,
}

impl SessionStatus {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a turn is already in progress")]
    Busy,

    #[error("only user messages can be submitted")]
    NotUserMessage,
}

/// Client-side conversation state, mutated only through frames.
#[derive(Debug, Default)]
pub struct Session {
    messages: Vec<Message>,
    status: SessionStatus,
    last_error: Option<String>,
    turn: Option<TurnProgress>,
    /// Id for the assistant message until `start` names it.
    pending_id: String,
    /// Slot of the running turn's assistant message in `messages`.
    assistant_index: Option<usize>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Assistant message of the running turn, or of the last finished one.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.role == Role::Assistant)
    }

    /// Steps seen in the running turn.
    pub fn steps_observed(&self) -> &[usize] {
        self.turn
            .as_ref()
            .map(TurnProgress::steps_observed)
            .unwrap_or_default()
    }

    /// Start a turn with a user message.
    pub fn submit(&mut self, message: Message) -> Result<(), SessionError> {
        if self.status.is_busy() {
            return Err(SessionError::Busy);
        }
        if message.role != Role::User {
            return Err(SessionError::NotUserMessage);
        }
        self.messages.push(message);
        self.status = SessionStatus::Submitted;
        self.last_error = None;
        self.turn = Some(TurnProgress::new());
        self.pending_id = gen_message_id();
        self.assistant_index = None;
        Ok(())
    }

    /// Apply one decoded frame to the running turn.
    ///
    /// The assistant message is edited in its slot; nothing is copied per frame.
    pub fn apply(&mut self, frame: &Frame) {
        let Some(turn) = self.turn.as_mut() else {
            tracing::debug!(?frame, "frame outside of a turn ignored");
            return;
        };
        if turn.is_finished() {
            tracing::debug!(?frame, "frame after end of turn ignored");
            return;
        }
        let idx = match self.assistant_index {
            Some(idx) => idx,
            None => {
                self.messages
                    .push(Message::assistant(std::mem::take(&mut self.pending_id)));
                let idx = self.messages.len() - 1;
                self.assistant_index = Some(idx);
                idx
            }
        };
        if !turn.apply(&mut self.messages[idx], frame) {
            return;
        }
        self.status = SessionStatus::Streaming;
        if turn.is_finished() {
            self.finish_turn();
        }
    }

    /// Close the running turn after the transport failed before `done`/`error`.
    pub fn fail_transport(&mut self, reason: impl std::fmt::Display) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let reason = format!("transport error: {reason}");
        match self.assistant_index {
            Some(idx) => turn.abort(&mut self.messages[idx], reason),
            None => turn.abort(&mut Message::assistant(""), reason),
        }
        self.finish_turn();
    }

    fn finish_turn(&mut self) {
        let Some(turn) = self.turn.take() else {
            return;
        };
        match turn.outcome() {
            Some(TurnOutcome::Done(reason)) => {
                tracing::debug!(?reason, frames = turn.frames_applied(), "turn finished");
                self.status = SessionStatus::Ready;
            }
            Some(TurnOutcome::Error(message)) => {
                tracing::warn!(error = %message, "turn failed");
                self.status = SessionStatus::Error;
                self.last_error = Some(message.clone());
            }
            None => {}
        }
        // A turn that failed before producing content leaves no assistant message.
        if let Some(idx) = self.assistant_index.take() {
            if self.messages[idx].parts.is_empty() {
                self.messages.remove(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol_data_stream::FinishReason;

    #[test]
    fn status_lifecycle() {
        let mut session = Session::new();
        assert_eq!(session.status(), SessionStatus::Idle);
        session.submit(Message::user("hi")).unwrap();
        assert_eq!(session.status(), SessionStatus::Submitted);
        assert_eq!(session.submit(Message::user("again")), Err(SessionError::Busy));

        session.apply(&Frame::start("a1"));
        assert_eq!(session.status(), SessionStatus::Streaming);
        session.apply(&Frame::text_delta("Hello"));
        session.apply(&Frame::done(FinishReason::Stop));

        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.messages().len(), 2);
        let assistant = session.last_assistant().unwrap();
        assert_eq!(assistant.id, "a1");
        assert_eq!(assistant.text(), "Hello");
    }

    #[test]
    fn only_user_messages_start_turns() {
        let mut session = Session::new();
        assert_eq!(
            session.submit(Message::assistant("a")),
            Err(SessionError::NotUserMessage)
        );
    }

    #[test]
    fn error_frame_sets_last_error_and_drops_empty_assistant() {
        let mut session = Session::new();
        session.submit(Message::user("hi")).unwrap();
        session.apply(&Frame::start("a1"));
        session.apply(&Frame::error("Model invocation failed: boom"));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.last_error(), Some("Model invocation failed: boom"));
        assert_eq!(session.messages().len(), 1);

        // Recovered: the next turn may start.
        session.submit(Message::user("retry")).unwrap();
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn transport_loss_closes_turn() {
        let mut session = Session::new();
        session.submit(Message::user("hi")).unwrap();
        session.apply(&Frame::text_delta("partial"));
        session.fail_transport("connection reset");
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.last_error().unwrap().contains("connection reset"));
        // Content received before the failure stays visible.
        assert_eq!(session.last_assistant().unwrap().text(), "partial");
    }

    #[test]
    fn streaming_edits_one_assistant_slot() {
        let mut session = Session::new();
        session.submit(Message::user("count")).unwrap();
        session.apply(&Frame::start("a1"));
        for n in 0..500 {
            session.apply(&Frame::text_delta(n.to_string()));
            assert_eq!(session.messages().len(), 2);
        }
        session.apply(&Frame::tool_call("c1", "web_search", serde_json::json!({})));
        session.apply(&Frame::done(FinishReason::ToolCalls));

        let expected: String = (0..500).map(|n| n.to_string()).collect();
        let assistant = &session.messages()[1];
        assert_eq!(assistant.id, "a1");
        assert_eq!(assistant.text(), expected);
        assert_eq!(assistant.parts.len(), 2);
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[test]
    fn transport_loss_before_any_frame_leaves_no_assistant() {
        let mut session = Session::new();
        session.submit(Message::user("hi")).unwrap();
        session.fail_transport("refused");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[test]
    fn frames_without_turn_are_ignored() {
        let mut session = Session::new();
        session.apply(&Frame::text_delta("stray"));
        assert!(session.messages().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }
}
