//! UI-agnostic chat state types
//!
//! This module contains the data structures shared between the terminal UI,
//! the HTTP backend and the server. None of it depends on a UI framework.

use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn in the chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// In-memory session state: the transcript plus upload status.
///
/// Messages are only ever appended. The one exception is
/// [`ChatState::truncate_to`], which the session uses to roll back an
/// optimistic append when a request fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    messages: Vec<Message>,
    pub document_loaded: bool,
    pub current_document: Option<String>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn mark_document_loaded(&mut self, name: impl Into<String>) {
        self.document_loaded = true;
        self.current_document = Some(name.into());
    }

    /// Drop every message past `len`. Only shrinks; a larger `len` is a no-op.
    pub(crate) fn truncate_to(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}
