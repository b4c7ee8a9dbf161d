mod app;
mod handler;
mod tui;
mod ui;

use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use docchat_core::{Backend, ChatSession, Config, HttpBackend, SimulatedBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "docchat")]
#[command(about = "Upload a document and chat about it from the terminal")]
struct Cli {
    /// Base URL of the docchat server
    #[arg(long)]
    api_url: Option<String>,
    /// Answer locally with canned responses instead of calling a server
    #[arg(long)]
    simulated: bool,
    /// Seconds to wait for a server response before giving up
    #[arg(long)]
    timeout_secs: Option<u64>,
}

/// Log to a file under the config directory, only when RUST_LOG is set.
/// The terminal is in raw mode, so nothing may be written to stderr.
fn init_logging() -> Result<()> {
    let Ok(filter) = EnvFilter::try_from_default_env() else {
        return Ok(());
    };

    let dir = Config::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("docchat.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn build_backend(cli: &Cli, config: &Config) -> Result<Backend> {
    if cli.simulated {
        return Ok(Backend::Simulated(SimulatedBackend::default()));
    }

    let api_url = cli.api_url.clone().unwrap_or_else(|| config.api_url());
    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or_else(|| config.timeout_secs()));
    Ok(Backend::Http(HttpBackend::new(&api_url, timeout)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    let backend = build_backend(&cli, &config)?;
    info!(backend = backend.kind().display_name(), "starting docchat");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(ChatSession::new(backend), events.sender());

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event).await?;
    }
    Ok(())
}
