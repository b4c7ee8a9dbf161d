//! Question answering over a single uploaded document.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ai::OllamaClient;
use crate::document::{load_document, LoadedDocument};
use crate::error::DocumentError;
use crate::state::{Message, Role};

/// Session used when a caller does not distinguish conversations.
pub const DEFAULT_SESSION: &str = "default";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a document-based chatbot. Your task is to help users \
extract information and insights from uploaded documents. Only answer questions based on the uploaded \
content. If a question is unrelated or beyond your scope, respond with: \"I'm sorry, I can't answer that.\" \
Your responses should be concise and accurate. Be polite and helpful at all times.";

/// One question/answer pair in an exported history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_query: String,
    pub ai_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryExport {
    pub messages: Vec<HistoryEntry>,
}

impl HistoryExport {
    /// Pair every user turn with the assistant turn that directly follows it.
    /// A trailing unanswered question is dropped.
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut entries = Vec::new();
        let mut pending: Option<&str> = None;
        for message in messages {
            match message.role {
                Role::User => pending = Some(&message.content),
                Role::Assistant => {
                    if let Some(query) = pending.take() {
                        entries.push(HistoryEntry {
                            user_query: query.to_string(),
                            ai_response: message.content.clone(),
                        });
                    }
                }
                Role::System => {}
            }
        }
        Self { messages: entries }
    }
}

pub struct QaAgent {
    ollama: OllamaClient,
    model: String,
    system_prompt: String,
    histories: HashMap<String, Vec<Message>>,
    document: Option<LoadedDocument>,
}

impl QaAgent {
    pub fn new(ollama: OllamaClient, model: &str) -> Self {
        Self {
            ollama,
            model: model.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            histories: HashMap::new(),
            document: None,
        }
    }

    /// Load a document and make it the sole context for later questions.
    pub fn add_document(&mut self, path: &Path) -> std::result::Result<&LoadedDocument, DocumentError> {
        let document = load_document(path)?;
        Ok(self.set_document(document))
    }

    /// Replace the context with an already extracted document.
    pub fn set_document(&mut self, document: LoadedDocument) -> &LoadedDocument {
        info!(document = %document.name, chars = document.content.len(), "document loaded into context");
        self.document.insert(document)
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn document_content(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.content.as_str())
    }

    pub fn history(&self, session: &str) -> &[Message] {
        self.histories
            .get(session)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The full message list sent to the model for `question`.
    ///
    /// The document text is prepended to the current question only; stored
    /// history keeps the bare questions.
    pub fn build_messages(&self, session: &str, question: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history(session).len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(self.history(session).iter().cloned());

        let prompt = match self.document_content() {
            Some(content) => format!("{}\n\n{}", content, question),
            None => question.to_string(),
        };
        messages.push(Message::user(prompt));
        messages
    }

    pub async fn chat(&mut self, session: &str, question: &str) -> Result<String> {
        let messages = self.build_messages(session, question);
        let reply = self.ollama.chat(&self.model, &messages).await?;

        let history = self.histories.entry(session.to_string()).or_default();
        history.push(Message::user(question));
        history.push(Message::assistant(reply.clone()));
        Ok(reply)
    }

    pub fn export_history(&self, session: &str, path: &Path) -> Result<()> {
        let export = HistoryExport::from_messages(self.history(session));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&export)?)?;
        info!(path = %path.display(), entries = export.messages.len(), "history saved");
        Ok(())
    }
}
