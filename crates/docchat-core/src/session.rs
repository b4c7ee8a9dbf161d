//! Upload and send handlers over a [`ChatState`].
//!
//! Each operation is split into a synchronous `begin_*` step (validation,
//! optimistic update, loading flag on) and a `finish_*` step that applies the
//! backend's result. A UI can run the backend call on a background task in
//! between; [`ChatSession::upload`] and [`ChatSession::send`] do all three
//! steps inline.

use tracing::{info, warn};

use crate::api::{ApiResponse, UploadFile};
use crate::backend::Backend;
use crate::error::{ChatError, Result};
use crate::state::{ChatState, Message};

/// An upload that passed validation and is waiting on the backend.
#[derive(Debug)]
pub struct PendingUpload {
    file: UploadFile,
}

impl PendingUpload {
    pub fn file(&self) -> &UploadFile {
        &self.file
    }
}

/// A message that was appended optimistically and is waiting on the backend.
#[derive(Debug)]
pub struct PendingSend {
    rollback_len: usize,
    text: String,
}

impl PendingSend {
    pub fn text(&self) -> &str {
        &self.text
    }
}

pub struct ChatSession {
    state: ChatState,
    backend: Backend,
    loading: bool,
}

impl ChatSession {
    pub fn new(backend: Backend) -> Self {
        Self {
            state: ChatState::new(),
            backend,
            loading: false,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn begin_upload(&mut self, file: UploadFile) -> Result<PendingUpload> {
        if file.name.is_empty() {
            return Err(ChatError::MissingFile);
        }
        if self.loading {
            return Err(ChatError::Busy);
        }
        self.loading = true;
        Ok(PendingUpload { file })
    }

    /// Apply an upload result. Returns the text to show the user on success.
    pub fn finish_upload(
        &mut self,
        pending: PendingUpload,
        result: Result<ApiResponse>,
    ) -> Result<String> {
        self.loading = false;
        let name = pending.file.name;
        match result {
            Ok(response) => {
                info!(document = %name, "document uploaded");
                self.state.mark_document_loaded(name.clone());
                Ok(response
                    .message
                    .unwrap_or_else(|| format!("Document {} uploaded successfully", name)))
            }
            Err(e) => {
                warn!(document = %name, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    pub async fn upload(&mut self, file: UploadFile) -> Result<String> {
        let pending = self.begin_upload(file)?;
        let result = self.backend.upload(pending.file()).await;
        self.finish_upload(pending, result)
    }

    /// Validate `text` and append it as a user message.
    ///
    /// Nothing is appended and no request may be issued when this fails.
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend> {
        if !self.state.document_loaded {
            return Err(ChatError::NoDocument);
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.loading {
            return Err(ChatError::Busy);
        }

        let rollback_len = self.state.len();
        self.state.push(Message::user(text));
        self.loading = true;
        Ok(PendingSend {
            rollback_len,
            text: text.to_string(),
        })
    }

    /// Append the reply, or roll the optimistic user message back on failure.
    pub fn finish_send(&mut self, pending: PendingSend, result: Result<Message>) -> Result<Message> {
        self.loading = false;
        match result {
            Ok(reply) => {
                self.state.push(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "chat request failed");
                self.state.truncate_to(pending.rollback_len);
                Err(e)
            }
        }
    }

    pub async fn send(&mut self, text: &str) -> Result<Message> {
        let pending = self.begin_send(text)?;
        let result = self.backend.send(pending.text()).await;
        self.finish_send(pending, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::state::Role;
    use std::time::Duration;

    fn simulated_session() -> ChatSession {
        ChatSession::new(Backend::Simulated(SimulatedBackend::new(Duration::ZERO)))
    }

    #[tokio::test]
    async fn test_upload_marks_document_loaded() {
        let mut session = simulated_session();
        let toast = session
            .upload(UploadFile::new("guide.docx", b"data".to_vec()))
            .await
            .unwrap();

        assert_eq!(toast, "Document guide.docx uploaded successfully");
        assert!(session.state().document_loaded);
        assert_eq!(session.state().current_document.as_deref(), Some("guide.docx"));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_send_requires_document() {
        let mut session = simulated_session();
        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::NoDocument));
        assert!(session.state().is_empty());
    }

    #[tokio::test]
    async fn test_send_rejects_whitespace() {
        let mut session = simulated_session();
        session.upload(UploadFile::new("a.txt", b"a".to_vec())).await.unwrap();

        let err = session.send("   \n\t").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(session.state().is_empty());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_send_appends_user_then_assistant() {
        let mut session = simulated_session();
        session.upload(UploadFile::new("a.txt", b"a".to_vec())).await.unwrap();
        session.send("first").await.unwrap();
        session.send("second").await.unwrap();

        let messages = session.state().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], Message::user("second"));
        assert_eq!(messages[3].role, Role::Assistant);
        assert_eq!(messages[3].content, "This is a simulated response to: second");
    }

    #[test]
    fn test_begin_send_blocks_duplicate_submission() {
        let mut session = simulated_session();
        session.state.mark_document_loaded("a.txt");

        let _pending = session.begin_send("one").unwrap();
        assert!(session.is_loading());
        assert!(matches!(session.begin_send("two"), Err(ChatError::Busy)));
        assert_eq!(session.state().len(), 1);
    }

    #[test]
    fn test_failed_send_rolls_back() {
        let mut session = simulated_session();
        session.state.mark_document_loaded("a.txt");
        session.state.push(Message::user("earlier"));
        let before = session.state().clone();

        let pending = session.begin_send("doomed").unwrap();
        assert_eq!(session.state().len(), 2);
        let result = session.finish_send(pending, Err(ChatError::SendFailed));

        assert!(result.is_err());
        assert_eq!(session.state(), &before);
        assert!(!session.is_loading());
    }

    #[test]
    fn test_failed_upload_leaves_state_unchanged() {
        let mut session = simulated_session();
        let pending = session
            .begin_upload(UploadFile::new("a.pdf", Vec::new()))
            .unwrap();
        let result = session.finish_upload(pending, Err(ChatError::UploadFailed));

        assert!(result.is_err());
        assert!(!session.state().document_loaded);
        assert_eq!(session.state().current_document, None);
        assert!(!session.is_loading());
    }
}
