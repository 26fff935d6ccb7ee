//! Multi-turn conversation state.
//!
//! History is a strictly alternating sequence of user and assistant turns,
//! starting with the user. Turns are only ever appended; the whole history can
//! be reset, individual committed turns cannot be removed.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Read-only view of a session's turns, oldest first.
pub type ConversationHistory = [ConversationTurn];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Active,
}

/// What the conversation is grounded on. Changing it starts a fresh history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    /// A processed document, identified by label and index version.
    Document { label: String, version: u64 },
    /// A company, identified by ticker or other subject id, together with the
    /// document version the chat was drawing excerpts from, if any.
    Company {
        ticker: String,
        document: Option<(String, u64)>,
    },
    /// Free-form finance chat with no specific grounding.
    General,
}

#[derive(Debug, Default, Clone)]
pub struct ConversationSession {
    turns: Vec<ConversationTurn>,
    topic: Option<Topic>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        if self.turns.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Active
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Role the next appended turn must have.
    pub fn expected_role(&self) -> Role {
        match self.turns.last() {
            Some(t) if t.role == Role::User => Role::Assistant,
            _ => Role::User,
        }
    }

    /// Append a turn, enforcing user/assistant alternation.
    pub fn append(&mut self, turn: ConversationTurn) -> Result<(), SessionError> {
        let expected = self.expected_role();
        if turn.role != expected {
            return Err(SessionError::OutOfOrder {
                expected,
                got: turn.role,
            });
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Clear the history. The topic binding is kept.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Ground the conversation on `topic`. Returns `true` if the history was
    /// reset because the topic changed.
    pub fn bind_topic(&mut self, topic: Topic) -> bool {
        if self.topic.as_ref() == Some(&topic) {
            return false;
        }
        let had_history = !self.turns.is_empty();
        self.turns.clear();
        self.topic = Some(topic);
        had_history
    }

    /// Open an exchange by recording the user's question.
    ///
    /// The returned [`PendingTurn`] borrows the session exclusively until the
    /// reply is committed, so a second question cannot start while one is in
    /// flight. Dropping it without committing withdraws the question.
    pub fn begin_turn(
        &mut self,
        question: impl Into<String>,
    ) -> Result<PendingTurn<'_>, SessionError> {
        self.append(ConversationTurn::user(question))?;
        Ok(PendingTurn {
            session: self,
            committed: false,
        })
    }
}

/// An exchange whose user turn is recorded and whose reply is outstanding.
#[derive(Debug)]
pub struct PendingTurn<'a> {
    session: &'a mut ConversationSession,
    committed: bool,
}

impl PendingTurn<'_> {
    /// History before the open question.
    pub fn prior_history(&self) -> &ConversationHistory {
        let turns = self.session.history();
        &turns[..turns.len() - 1]
    }

    /// The open question.
    pub fn question(&self) -> &str {
        let turns = self.session.history();
        &turns[turns.len() - 1].content
    }

    /// Record the assistant's reply, closing the exchange.
    pub fn commit(mut self, reply: impl Into<String>) {
        self.session.turns.push(ConversationTurn::assistant(reply));
        self.committed = true;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            // The open user turn is always last while the exchange is pending.
            self.session.turns.pop();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("expected a {expected} turn but got a {got} turn")]
    OutOfOrder { expected: Role, got: Role },
}
