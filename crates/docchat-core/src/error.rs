use thiserror::Error;

/// Failures of a single upload or chat request.
///
/// Every variant is terminal for the request that produced it; nothing is
/// retried.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No file provided")]
    MissingFile,

    #[error("No message provided")]
    EmptyMessage,

    #[error("Please upload a document first")]
    NoDocument,

    #[error("A request is already in progress")]
    Busy,

    #[error("Upload failed")]
    UploadFailed,

    #[error("Failed to send message")]
    SendFailed,

    /// The service answered 2xx but reported `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected response from chat service")]
    MalformedResponse,

    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Failures while extracting text from an uploaded document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("File at {0} does not exist")]
    NotFound(String),

    #[error("Unsupported file format: {0}")]
    Unsupported(String),

    #[error("Could not read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not extract PDF text: {0}")]
    Pdf(String),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}
