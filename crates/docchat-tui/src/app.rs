use std::path::PathBuf;

use docchat_core::{
    ApiResponse, BackendKind, ChatError, ChatSession, ChatState, Message, PendingSend,
    PendingUpload, UploadFile,
};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::tui::AppEvent;

/// How many ticks (300ms each) a toast stays on screen.
const TOAST_TICKS: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub kind: ToastKind,
    pub title: &'static str,
    pub text: String,
    ticks_left: u8,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub session: ChatSession,

    // Message input
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Upload prompt
    pub upload_input: String,
    pub upload_cursor: usize,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub chat_area: Option<Rect>,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub toast: Option<Toast>,

    pending_upload: Option<PendingUpload>,
    pending_send: Option<PendingSend>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(session: ChatSession, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            session,
            input: String::new(),
            cursor: 0,
            upload_input: String::new(),
            upload_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            toast: None,
            pending_upload: None,
            pending_send: None,
            events,
        }
    }

    pub fn state(&self) -> &ChatState {
        self.session.state()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.session.backend().kind()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Name of the document currently being uploaded, if any.
    pub fn uploading(&self) -> Option<&str> {
        self.pending_upload.as_ref().map(|p| p.file().name.as_str())
    }

    pub fn is_thinking(&self) -> bool {
        self.pending_send.is_some()
    }

    pub fn show_success(&mut self, text: impl Into<String>) {
        self.toast = Some(Toast {
            kind: ToastKind::Success,
            title: "Success",
            text: text.into(),
            ticks_left: TOAST_TICKS,
        });
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.toast = Some(Toast {
            kind: ToastKind::Error,
            title: "Error",
            text: text.into(),
            ticks_left: TOAST_TICKS,
        });
    }

    /// Validate and send the input box contents on a background task.
    pub fn submit_message(&mut self) {
        if self.is_loading() {
            return;
        }

        match self.session.begin_send(&self.input) {
            Ok(pending) => {
                self.input.clear();
                self.cursor = 0;

                let backend = self.session.backend().clone();
                let message = pending.text().to_string();
                let tx = self.events.clone();
                self.pending_send = Some(pending);
                self.scroll_to_bottom();

                debug!(chars = message.len(), "sending message");
                tokio::spawn(async move {
                    let result = backend.send(&message).await;
                    let _ = tx.send(AppEvent::Replied(result));
                });
            }
            // Blank input is ignored without a toast.
            Err(ChatError::EmptyMessage) => {}
            Err(e) => self.show_error(e.to_string()),
        }
    }

    pub fn on_replied(&mut self, result: Result<Message, ChatError>) {
        let Some(pending) = self.pending_send.take() else {
            return;
        };
        match self.session.finish_send(pending, result) {
            Ok(_) => self.scroll_to_bottom(),
            Err(e) => self.show_error(e.to_string()),
        }
    }

    /// Read the file named in the upload prompt and upload it in the background.
    pub async fn start_upload(&mut self) {
        let raw = self.upload_input.trim().to_string();
        self.upload_input.clear();
        self.upload_cursor = 0;
        self.input_mode = InputMode::Normal;

        if raw.is_empty() {
            return;
        }
        let path = expand_home(&raw);

        let file = match UploadFile::from_path(&path).await {
            Ok(file) => file,
            Err(e) => {
                self.show_error(format!("Could not read {}: {}", path.display(), e));
                return;
            }
        };

        match self.session.begin_upload(file) {
            Ok(pending) => {
                let backend = self.session.backend().clone();
                let file = pending.file().clone();
                let tx = self.events.clone();
                info!(document = %file.name, "upload started");
                self.pending_upload = Some(pending);

                tokio::spawn(async move {
                    let result = backend.upload(&file).await;
                    let _ = tx.send(AppEvent::Uploaded(result));
                });
            }
            Err(e) => self.show_error(e.to_string()),
        }
    }

    pub fn on_uploaded(&mut self, result: Result<ApiResponse, ChatError>) {
        let Some(pending) = self.pending_upload.take() else {
            return;
        };
        match self.session.finish_upload(pending, result) {
            Ok(message) => self.show_success(message),
            Err(e) => self.show_error(e.to_string()),
        }
    }

    /// Tick animation frame and expire the toast (called by Tick event)
    pub fn tick(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some(toast) = &mut self.toast {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                self.toast = None;
            }
        }
    }

    fn total_chat_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.state().messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                // Character count, not byte length, for UTF-8 text
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count / wrap_width + 1 };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.is_thinking() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }
        total_lines
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
