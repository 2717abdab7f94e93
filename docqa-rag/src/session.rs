//! Caller-owned conversation state.
//!
//! The pipeline itself is stateless apart from the index. A chat front end
//! keeps a [`ChatHistory`] and records each exchange in it; the history is
//! never fed back into retrieval or the prompt.

use serde::{Deserialize, Serialize};

use crate::document::AnswerResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Chunk texts the answer was built from. Empty for user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// Ordered record of a chat session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, question: impl Into<String>) {
        self.messages.push(ChatMessage { role: Role::User, content: question.into(), sources: Vec::new() });
    }

    pub fn push_assistant(&mut self, response: &AnswerResponse) {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: response.answer.clone(),
            sources: response.sources.clone(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
