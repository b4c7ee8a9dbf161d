pub mod agent;
pub mod ai;
pub mod api;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use agent::{HistoryEntry, HistoryExport, QaAgent, DEFAULT_SESSION};
pub use ai::OllamaClient;
pub use api::{ApiResponse, UploadFile};
pub use backend::{Backend, BackendKind, HttpBackend, SimulatedBackend};
pub use config::Config;
pub use document::{is_allowed, load_document, sanitize_filename, LoadedDocument};
pub use error::{ChatError, DocumentError};
pub use session::{ChatSession, PendingSend, PendingUpload};
pub use state::{ChatState, Message, Role};
