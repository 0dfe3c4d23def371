//! Append-only conversation history.

use serde::Serialize;
use std::time::Instant;

/// One turn of the conversation. Never mutated once appended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationTurn {
    UserUtterance {
        text: String,
        submitted_at: Instant,
    },
    AgentReply {
        text: String,
        /// Reference to the audio that carried the reply, if any.
        audio_ref: Option<String>,
    },
}

impl ConversationTurn {
    pub fn text(&self) -> &str {
        match self {
            ConversationTurn::UserUtterance { text, .. } => text,
            ConversationTurn::AgentReply { text, .. } => text,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ConversationTurn::UserUtterance { .. } => "user",
            ConversationTurn::AgentReply { .. } => "agent",
        }
    }
}

/// Turn as sent to the backend for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextTurn {
    pub role: String,
    pub text: String,
}

/// Ordered history of one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent_context(&self, n: usize) -> Vec<ContextTurn> {
        self.context_excluding(usize::MAX, n)
    }

    /// The last `n` turns other than the one at `skip`, oldest first.
    ///
    /// A request carries its own utterance as `text`, so that turn is left out
    /// of its context.
    pub fn context_excluding(&self, skip: usize, n: usize) -> Vec<ContextTurn> {
        let mut context: Vec<ContextTurn> = self
            .turns
            .iter()
            .enumerate()
            .rev()
            .filter(|(index, _)| *index != skip)
            .take(n)
            .map(|(_, turn)| ContextTurn {
                role: turn.role().to_string(),
                text: turn.text().to_string(),
            })
            .collect();
        context.reverse();
        context
    }
}
