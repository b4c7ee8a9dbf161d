//! Data-access layers for the two chat operations.
//!
//! `Simulated` answers locally with canned text and never touches the
//! network. `Http` talks to a chat service exposing `/api/upload` and
//! `/api/chat`.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, warn};

use crate::api::{ApiResponse, UploadFile};
use crate::error::{ChatError, Result};
use crate::state::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Simulated,
    Http,
}

impl BackendKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Simulated => "Simulated (offline)",
            BackendKind::Http => "Chat API",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    delay: Duration,
}

impl SimulatedBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn upload(&self, file: &UploadFile) -> Result<ApiResponse> {
        Ok(ApiResponse::ok(format!(
            "Document {} uploaded successfully",
            file.name
        )))
    }

    async fn send(&self, message: &str) -> Result<Message> {
        tokio::time::sleep(self.delay).await;
        Ok(Message::assistant(format!(
            "This is a simulated response to: {}",
            message
        )))
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn upload(&self, file: &UploadFile) -> Result<ApiResponse> {
        let url = format!("{}/api/upload", self.base_url);
        let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        // Raw UTF-8 file name, so non-ASCII names reach the server as typed
        let form = Form::new().percent_encode_noop().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "upload rejected by chat service");
            return Err(ChatError::UploadFailed);
        }

        let body: ApiResponse = response.json().await?;
        if !body.success {
            return Err(ChatError::Rejected(
                body.message
                    .unwrap_or_else(|| "Failed to upload document".to_string()),
            ));
        }
        Ok(body)
    }

    async fn send(&self, message: &str) -> Result<Message> {
        let url = format!("{}/api/chat", self.base_url);
        let form = Form::new().text("message", message.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "chat request rejected by chat service");
            return Err(ChatError::SendFailed);
        }

        let body: ApiResponse = response.json().await?;
        match (body.success, body.response) {
            (true, Some(reply)) => Ok(reply),
            (true, None) => Err(ChatError::MalformedResponse),
            (false, _) => Err(ChatError::Rejected(
                body.message
                    .unwrap_or_else(|| "Failed to send message".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Backend {
    Simulated(SimulatedBackend),
    Http(HttpBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Simulated(_) => BackendKind::Simulated,
            Backend::Http(_) => BackendKind::Http,
        }
    }

    /// Upload a document. A file without a name is rejected before any I/O.
    pub async fn upload(&self, file: &UploadFile) -> Result<ApiResponse> {
        if file.name.is_empty() {
            return Err(ChatError::MissingFile);
        }
        debug!(file = %file.name, bytes = file.bytes.len(), "uploading document");
        match self {
            Backend::Simulated(backend) => backend.upload(file).await,
            Backend::Http(backend) => backend.upload(file).await,
        }
    }

    /// Send one chat message and return the assistant's reply.
    pub async fn send(&self, message: &str) -> Result<Message> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        match self {
            Backend::Simulated(backend) => backend.send(message).await,
            Backend::Http(backend) => backend.send(message).await,
        }
    }
}
