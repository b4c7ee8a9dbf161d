use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use docchat_core::document::{is_allowed, load_document, sanitize_filename};
use docchat_core::{ApiResponse, DEFAULT_SESSION};
use tracing::{error, info, warn};

use crate::AppState;

type Reply = (StatusCode, Json<ApiResponse>);

fn success(response: ApiResponse) -> Reply {
    (StatusCode::OK, Json(response))
}

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    let message = message.into();
    warn!(status = %status, %message, "request rejected");
    (status, Json(ApiResponse::failure(message)))
}

/// The first field called `wanted`, as (file name, contents).
async fn read_field(
    multipart: &mut Multipart,
    wanted: &str,
) -> Result<Option<(Option<String>, Bytes)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(wanted) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Some((file_name, bytes)));
    }
    Ok(None)
}

pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok("ok"))
}

pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Reply {
    let (file_name, bytes) = match read_field(&mut multipart, "file").await {
        Ok(Some((Some(name), bytes))) if !name.is_empty() => (name, bytes),
        Ok(Some(_)) => return failure(StatusCode::BAD_REQUEST, "No selected file"),
        Ok(None) => return failure(StatusCode::BAD_REQUEST, "No file part"),
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e)),
    };

    if !is_allowed(&file_name) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Unsupported file type. Please upload a supported document.",
        );
    }
    let Some(safe_name) = sanitize_filename(&file_name) else {
        return failure(StatusCode::BAD_REQUEST, "Invalid file name");
    };

    if let Err(e) = tokio::fs::create_dir_all(&state.upload_dir).await {
        error!(dir = %state.upload_dir.display(), error = %e, "cannot create upload directory");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Could not store document: {}", e));
    }
    let path = state.upload_dir.join(&safe_name);
    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        error!(path = %path.display(), error = %e, "cannot write upload");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, format!("Could not store document: {}", e));
    }
    info!(document = %file_name, path = %path.display(), bytes = bytes.len(), "document stored");

    // PDF extraction can take a while; run it on the blocking pool.
    let extracted = tokio::task::spawn_blocking(move || load_document(&path)).await;
    let document = match extracted {
        Ok(Ok(document)) => document,
        Ok(Err(e)) => {
            error!(document = %file_name, error = %e, "document extraction failed");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing document: {}", e),
            );
        }
        Err(e) => {
            error!(document = %file_name, error = %e, "document extraction task failed");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing document: {}", e),
            );
        }
    };

    state.agent.lock().await.set_document(document);

    success(ApiResponse::ok(format!(
        "Document {} uploaded and processed successfully",
        file_name
    )))
}

pub async fn chat(State(state): State<AppState>, mut multipart: Multipart) -> Reply {
    let message = match read_field(&mut multipart, "message").await {
        Ok(Some((_, bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(None) => String::new(),
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Malformed request: {}", e)),
    };
    if message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "No message provided");
    }

    let mut agent = state.agent.lock().await;
    if agent.document_content().is_none() {
        // In-band failure with a 200 status.
        warn!("chat request before any document was loaded");
        return success(ApiResponse::failure("No document loaded"));
    }

    match agent.chat(DEFAULT_SESSION, &message).await {
        Ok(reply) => {
            info!(question_chars = message.len(), reply_chars = reply.len(), "chat answered");
            success(ApiResponse::reply(reply))
        }
        Err(e) => {
            error!(error = %e, "model request failed");
            failure(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
