use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
};
use docchat_core::Role;
use crate::app::{App, InputMode, ToastKind};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.input_mode == InputMode::Upload {
        render_upload_prompt(app, frame, area);
    }
    render_toast(app, frame, area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let document = match (app.uploading(), &app.state().current_document) {
        (Some(name), _) => Span::styled(
            format!(" Uploading {}... ", name),
            Style::default().fg(Color::Yellow),
        ),
        (None, Some(name)) => Span::styled(format!(" {} ", name), Style::default().fg(Color::Green)),
        (None, None) => Span::styled(" no document ", Style::default().fg(Color::Gray)),
    };

    let title = Line::from(vec![
        Span::styled(" Document Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("[{}]", app.backend_kind().display_name()),
            Style::default().fg(Color::Gray),
        ),
        document,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn role_label(role: Role) -> Span<'static> {
    match role {
        Role::User => Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Role::Assistant => Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Role::System => Span::styled(
            "System:",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ),
    }
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    // Inner size minus borders, used for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Chat ");

    let state = app.state();
    if state.is_empty() && !app.is_thinking() {
        let hint = if state.document_loaded {
            "Upload complete. Ask me anything about the document!"
        } else {
            "Upload a document to get started (press u)"
        };
        let placeholder = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for msg in state.messages() {
        lines.push(Line::from(role_label(msg.role)));
        match msg.role {
            Role::Assistant => lines.extend(msg.content.lines().map(parse_markdown_line)),
            _ => lines.extend(msg.content.lines().map(|l| Line::from(l.to_string()))),
        }
        lines.push(Line::default());
    }

    if app.is_thinking() {
        lines.push(Line::from(role_label(Role::Assistant)));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let total_lines = lines.len();
    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);

    if total_lines > app.chat_height as usize {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));
        let mut scrollbar_state = ScrollbarState::new(total_lines).position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Message ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.cursor < inner_width {
        0
    } else {
        app.cursor - inner_width + 1
    };

    let input = if app.input.is_empty() && !editing {
        let placeholder = if app.state().document_loaded {
            "Ask a question about the document..."
        } else {
            "Upload a document first"
        };
        Paragraph::new(placeholder).style(Style::default().fg(Color::DarkGray))
    } else {
        let visible: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(input.block(block), area);

    if editing {
        let cursor_x = (app.cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
        InputMode::Upload => (" UPLOAD ", Style::default().bg(Color::Magenta).fg(Color::White)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            (" i ", " type "),
            (" u ", " upload "),
            (" j/k ", " scroll "),
            (" g/G ", " top/bottom "),
            (" q ", " quit "),
        ],
        InputMode::Editing => &[
            (" Enter ", " send "),
            (" C-o ", " upload "),
            (" Esc ", " stop typing "),
        ],
        InputMode::Upload => &[(" Enter ", " upload "), (" Esc ", " cancel ")],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    for (key, label) in pairs {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Centered popup area of the given size, clamped to the frame.
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_upload_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 70, 6);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Upload Document ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Path to a txt, md, pdf, csv, xlsx, docx, pptx or json file")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let scroll_offset = if width == 0 || app.upload_cursor < width {
        0
    } else {
        app.upload_cursor - width + 1
    };
    let visible: String = app.upload_input.chars().skip(scroll_offset).take(width).collect();
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = (app.upload_cursor - scroll_offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

fn render_toast(app: &App, frame: &mut Frame, area: Rect) {
    let Some(toast) = &app.toast else {
        return;
    };

    let color = match toast.kind {
        ToastKind::Success => Color::Green,
        ToastKind::Error => Color::Red,
    };
    let width = (toast.text.chars().count() as u16 + 4).clamp(24, 60);
    let toast_area = popup_rect(Rect::new(area.x, area.y + 1, area.width, 5), width, 4);
    // Pin to the top-right corner below the header
    let toast_area = Rect {
        x: area.right().saturating_sub(toast_area.width + 1),
        ..toast_area
    };

    frame.render_widget(Clear, toast_area);
    let body = Paragraph::new(toast.text.as_str())
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", toast.title)),
        );
    frame.render_widget(body, toast_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_bold_markdown_is_styled() {
        let line = parse_markdown_line("The **deadline** is Friday");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "deadline");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(plain(&line), "The deadline is Friday");
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(plain(&line), "a **b");
    }

    #[test]
    fn test_popup_rect_is_centered_and_clamped() {
        let rect = popup_rect(Rect::new(0, 0, 100, 40), 70, 6);
        assert_eq!(rect, Rect::new(15, 17, 70, 6));

        let small = popup_rect(Rect::new(0, 0, 20, 3), 70, 6);
        assert_eq!(small.width, 16);
        assert_eq!(small.height, 3);
    }
}
