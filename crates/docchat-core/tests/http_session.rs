use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use docchat_core::{Backend, ChatError, ChatSession, HttpBackend, Message, Role, UploadFile};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct StubState {
    hits: Arc<AtomicUsize>,
    fail_chat: Arc<AtomicBool>,
    reject_upload: Arc<AtomicBool>,
    hang_chat: Arc<AtomicBool>,
}

async fn read_field(multipart: &mut Multipart, wanted: &str) -> Option<(Option<String>, String)> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some(wanted) {
            let file_name = field.file_name().map(str::to_string);
            let text = field.text().await.unwrap_or_default();
            return Some((file_name, text));
        }
    }
    None
}

async fn upload_handler(State(state): State<StubState>, mut multipart: Multipart) -> Json<serde_json::Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let file_name = read_field(&mut multipart, "file")
        .await
        .and_then(|(name, _)| name)
        .unwrap_or_default();

    if state.reject_upload.load(Ordering::SeqCst) {
        return Json(json!({ "success": false, "message": "Unsupported file type" }));
    }
    Json(json!({
        "success": true,
        "message": format!("Document {} uploaded and processed successfully", file_name),
    }))
}

async fn chat_handler(State(state): State<StubState>, mut multipart: Multipart) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let message = read_field(&mut multipart, "message")
        .await
        .map(|(_, text)| text)
        .unwrap_or_default();

    if state.hang_chat.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if state.fail_chat.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({
        "success": true,
        "response": { "role": "assistant", "content": format!("echo: {}", message) },
    }))
    .into_response()
}

async fn start_stub() -> (String, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), state)
}

fn session_for(base_url: &str, timeout: Duration) -> ChatSession {
    ChatSession::new(Backend::Http(HttpBackend::new(base_url, timeout).unwrap()))
}

fn sample_file() -> UploadFile {
    UploadFile::new("handbook.txt", b"Employees get 25 days of leave.".to_vec())
}

#[tokio::test]
async fn chat_before_upload_makes_no_request() {
    let (url, stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));

    let err = session.send("How many days of leave?").await.unwrap_err();

    assert!(matches!(err, ChatError::NoDocument));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 0);
    assert!(session.state().is_empty());
}

#[tokio::test]
async fn blank_message_makes_no_request() {
    let (url, stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));
    session.upload(sample_file()).await.unwrap();
    let after_upload = stub.hits.load(Ordering::SeqCst);

    let err = session.send("  \t ").await.unwrap_err();

    assert!(matches!(err, ChatError::EmptyMessage));
    assert_eq!(stub.hits.load(Ordering::SeqCst), after_upload);
}

#[tokio::test]
async fn upload_records_current_document() {
    let (url, _stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));

    let toast = session.upload(sample_file()).await.unwrap();

    assert_eq!(toast, "Document handbook.txt uploaded and processed successfully");
    assert!(session.state().document_loaded);
    assert_eq!(session.state().current_document.as_deref(), Some("handbook.txt"));
}

#[tokio::test]
async fn non_ascii_file_name_reaches_server_unchanged() {
    let (url, _stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));

    let toast = session
        .upload(UploadFile::new("報告 2024.txt", b"Revenue rose.".to_vec()))
        .await
        .unwrap();

    assert_eq!(toast, "Document 報告 2024.txt uploaded and processed successfully");
    assert_eq!(session.state().current_document.as_deref(), Some("報告 2024.txt"));
}

#[tokio::test]
async fn send_appends_user_and_reply_in_order() {
    let (url, _stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));
    session.upload(sample_file()).await.unwrap();
    session.send("first").await.unwrap();

    let reply = session.send("How many days?").await.unwrap();

    assert_eq!(reply.role, Role::Assistant);
    let messages = session.state().messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2], Message::user("How many days?"));
    assert_eq!(messages[3], Message::assistant("echo: How many days?"));
}

#[tokio::test]
async fn failed_send_leaves_messages_unchanged() {
    let (url, stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_secs(5));
    session.upload(sample_file()).await.unwrap();
    session.send("ok").await.unwrap();
    let before = session.state().clone();

    stub.fail_chat.store(true, Ordering::SeqCst);
    let err = session.send("this one fails").await.unwrap_err();

    assert!(matches!(err, ChatError::SendFailed));
    assert_eq!(session.state(), &before);
    assert!(!session.is_loading());
}

#[tokio::test]
async fn rejected_upload_leaves_state_unchanged() {
    let (url, stub) = start_stub().await;
    stub.reject_upload.store(true, Ordering::SeqCst);
    let mut session = session_for(&url, Duration::from_secs(5));

    let err = session.upload(sample_file()).await.unwrap_err();

    match err {
        ChatError::Rejected(message) => assert_eq!(message, "Unsupported file type"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.state().document_loaded);
    assert_eq!(session.state().current_document, None);
}

#[tokio::test]
async fn hung_request_times_out_and_clears_loading() {
    let (url, stub) = start_stub().await;
    let mut session = session_for(&url, Duration::from_millis(300));
    session.upload(sample_file()).await.unwrap();

    stub.hang_chat.store(true, Ordering::SeqCst);
    let err = session.send("anyone there?").await.unwrap_err();

    assert!(matches!(err, ChatError::Http(_)));
    assert!(!session.is_loading());
    assert!(session.state().is_empty());
}
