mod http;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub use http::OpenAiCompatClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

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

/// "Given this transcript, produce the next assistant message."
///
/// Blocking from the caller's point of view. Any failure is one error with no partial reply.
pub trait ChatBackend {
    fn complete(&self, transcript: &[ChatMessage]) -> Result<String, ChatError>;
}

impl<T: ChatBackend + ?Sized> ChatBackend for Box<T> {
    fn complete(&self, transcript: &[ChatMessage]) -> Result<String, ChatError> {
        (**self).complete(transcript)
    }
}
