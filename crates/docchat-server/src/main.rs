use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use docchat_core::{Config, OllamaClient, QaAgent, DEFAULT_SESSION};
use docchat_server::{router, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docchat-server")]
#[command(about = "Chat about an uploaded document using a local Ollama model")]
struct Cli {
    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,
    /// Ollama base URL
    #[arg(long)]
    ollama_url: Option<String>,
    /// Ollama model to use
    #[arg(short, long)]
    model: Option<String>,
    /// Directory uploaded documents are stored in
    #[arg(long)]
    upload_dir: Option<PathBuf>,
    /// Origin allowed to call the API from a browser
    #[arg(long)]
    frontend_origin: Option<String>,
    /// Write the chat history here on shutdown
    #[arg(long)]
    history: Option<PathBuf>,
    /// Seconds to wait for the model before failing a chat request
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });

    let bind_addr = cli.bind.unwrap_or_else(|| config.bind_addr());
    let ollama_url = cli.ollama_url.unwrap_or_else(|| config.ollama_url());
    let model = cli.model.unwrap_or_else(|| config.model());
    let upload_dir = cli.upload_dir.unwrap_or_else(|| config.upload_dir());
    let frontend_origin = cli.frontend_origin.unwrap_or_else(|| config.frontend_origin());
    let history_path = cli.history.or_else(|| config.history_path.clone());
    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or_else(|| config.timeout_secs()));

    let ollama = OllamaClient::new(&ollama_url, timeout)?;
    match ollama.has_model(&model).await {
        Ok(true) => info!(%model, "model available"),
        Ok(false) => warn!(%model, "model not found, pull it with: ollama pull {}", model),
        Err(e) => warn!(url = %ollama_url, error = %e, "Ollama not reachable, make sure it is running with: ollama serve"),
    }

    let state = AppState::new(QaAgent::new(ollama, &model), upload_dir.clone());
    let app = router(state.clone(), &frontend_origin)?;

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        upload_dir = %upload_dir.display(),
        %frontend_origin,
        "docchat server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(path) = history_path {
        state.agent.lock().await.export_history(DEFAULT_SESSION, &path)?;
    }

    Ok(())
}
