use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use docchat_core::{ApiResponse, OllamaClient, QaAgent, Role};
use docchat_server::{router, AppState};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct FakeOllama {
    last_request: Arc<Mutex<Option<Value>>>,
    fail: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
}

async fn fake_chat(State(fake): State<FakeOllama>, Json(body): Json<Value>) -> Response {
    *fake.last_request.lock().await = Some(body);
    if fake.stall.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    if fake.fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    Json(json!({
        "model": "llama3.2",
        "message": { "role": "assistant", "content": "Twenty-five days." },
        "done": true,
    }))
    .into_response()
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

struct Harness {
    base_url: String,
    fake: FakeOllama,
    client: reqwest::Client,
    _upload_dir: tempfile::TempDir,
    upload_path: std::path::PathBuf,
}

async fn start() -> Harness {
    start_with_timeout(Duration::from_secs(10)).await
}

async fn start_with_timeout(model_timeout: Duration) -> Harness {
    let fake = FakeOllama::default();
    let ollama_url = serve(
        Router::new()
            .route("/api/chat", post(fake_chat))
            .with_state(fake.clone()),
    )
    .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let upload_path = upload_dir.path().join("uploads");
    let ollama = OllamaClient::new(&ollama_url, model_timeout).unwrap();
    let agent = QaAgent::new(ollama, "llama3.2");
    let app = router(AppState::new(agent, upload_path.clone()), "http://localhost:3000").unwrap();
    let base_url = serve(app).await;

    Harness {
        base_url,
        fake,
        client: reqwest::Client::new(),
        _upload_dir: upload_dir,
        upload_path,
    }
}

impl Harness {
    async fn upload(&self, name: &str, body: &str) -> (StatusCode, ApiResponse) {
        let part = Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string());
        let form = Form::new().percent_encode_noop().part("file", part);
        self.post_form("/api/upload", form).await
    }

    async fn chat(&self, message: &str) -> (StatusCode, ApiResponse) {
        let form = Form::new().text("message", message.to_string());
        self.post_form("/api/chat", form).await
    }

    async fn post_form(&self, path: &str, form: Form) -> (StatusCode, ApiResponse) {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = start().await;
    let body: ApiResponse = reqwest::get(format!("{}/api/health", harness.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, ApiResponse::ok("ok"));
}

#[tokio::test]
async fn chat_before_upload_reports_no_document() {
    let harness = start().await;
    let (status, body) = harness.chat("anything?").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ApiResponse::failure("No document loaded"));
    assert!(harness.fake.last_request.lock().await.is_none());
}

#[tokio::test]
async fn upload_rejects_unsupported_type() {
    let harness = start().await;
    let (status, body) = harness.upload("payload.exe", "MZ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.success);
    assert!(!harness.upload_path.join("payload.exe").exists());
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let harness = start().await;
    let form = Form::new().text("other", "value");
    let (status, body) = harness.post_form("/api/upload", form).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.message.as_deref(), Some("No file part"));
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let harness = start().await;
    let (status, body) = harness.chat("   ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.message.as_deref(), Some("No message provided"));
}

#[tokio::test]
async fn upload_then_chat_sends_document_to_model() {
    let harness = start().await;

    let (status, body) = harness
        .upload("handbook.txt", "Employees get 25 days of leave.")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.message.as_deref(),
        Some("Document handbook.txt uploaded and processed successfully")
    );
    assert!(harness.upload_path.join("handbook.txt").exists());

    let (status, body) = harness.chat("How many days of leave?").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
    let reply = body.response.unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Twenty-five days.");

    let request = harness.fake.last_request.lock().await.clone().unwrap();
    assert_eq!(request["model"], "llama3.2");
    assert_eq!(request["stream"], false);
    let messages = request["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(
        messages.last().unwrap()["content"],
        "Employees get 25 days of leave.\n\nHow many days of leave?"
    );
}

#[tokio::test]
async fn follow_up_questions_carry_history() {
    let harness = start().await;
    harness.upload("notes.md", "Launch is on Friday.").await;
    harness.chat("When is launch?").await;
    harness.chat("Which day again?").await;

    let request = harness.fake.last_request.lock().await.clone().unwrap();
    let messages = request["messages"].as_array().unwrap();
    // system, previous question, previous answer, current question
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1]["content"], "When is launch?");
    assert_eq!(messages[2]["role"], "assistant");
}

#[tokio::test]
async fn model_failure_maps_to_bad_gateway() {
    let harness = start().await;
    harness.upload("a.txt", "text").await;
    harness.fake.fail.store(true, Ordering::SeqCst);

    let (status, body) = harness.chat("hello?").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.success);
    assert!(body.response.is_none());
}

#[tokio::test]
async fn traversal_names_stay_inside_upload_dir() {
    let harness = start().await;
    let (status, _) = harness.upload("../../escape.txt", "contents").await;

    assert_eq!(status, StatusCode::OK);
    assert!(harness.upload_path.join("escape.txt").exists());
    let parent = harness.upload_path.parent().unwrap();
    assert!(!Path::new(parent).join("escape.txt").exists());
}

#[tokio::test]
async fn non_ascii_file_name_keeps_its_extension() {
    let harness = start().await;
    let (status, body) = harness.upload("報告.txt", "Quarterly revenue rose 4%.").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.message.as_deref(),
        Some("Document 報告.txt uploaded and processed successfully")
    );
    assert!(harness.upload_path.join("upload.txt").exists());

    let (status, body) = harness.chat("What rose?").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
}

#[tokio::test]
async fn corrupt_document_reports_processing_error() {
    let harness = start().await;
    let (status, body) = harness.upload("broken.docx", "this is not a zip archive").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.success);
    assert!(body
        .message
        .unwrap()
        .starts_with("Error processing document"));

    // The failed upload leaves no document behind
    let (_, body) = harness.chat("anything?").await;
    assert_eq!(body, ApiResponse::failure("No document loaded"));
}

#[tokio::test]
async fn stalled_model_does_not_block_uploads() {
    let harness = Arc::new(start_with_timeout(Duration::from_millis(500)).await);
    harness.upload("a.txt", "text").await;
    harness.fake.stall.store(true, Ordering::SeqCst);

    let chatting = {
        let harness = harness.clone();
        tokio::spawn(async move { harness.chat("hello?").await })
    };
    // Let the chat request take the agent lock first
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _) = tokio::time::timeout(Duration::from_secs(5), harness.upload("b.txt", "more"))
        .await
        .expect("upload waited on the stalled model");
    assert_eq!(status, StatusCode::OK);

    let (status, body) = tokio::time::timeout(Duration::from_secs(5), chatting)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.success);
}
