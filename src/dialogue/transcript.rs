use serde::Serialize;

use crate::chat::{ChatMessage, Role};

/// Messages sent to the chat collaborator: the system prompt first, then alternating
/// instruction and reply turns. Only the driver appends; a failed exchange is cut back
/// with `truncate`.
#[derive(Clone, Debug, Serialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system)],
        }
    }

    /// Drops everything but the system message.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Length to pass back to `truncate` if the next exchange fails.
    pub fn mark(&self) -> usize {
        self.messages.len()
    }

    /// Never removes the system message.
    pub fn truncate(&mut self, mark: usize) {
        self.messages.truncate(mark.max(1));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// What the user sees: their own answers and the assistant's replies, never the
/// instructions. Kept apart from the transcript so a failed turn can leave the user's
/// message visible while the transcript is rolled back.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Conversation {
    entries: Vec<ChatMessage>,
}

impl Conversation {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.entries.push(ChatMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.entries.push(ChatMessage::assistant(text));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }
}
