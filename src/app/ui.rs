use crate::{
    app::{App, CurrentScreen, Focus, InputKind, SettingItem, TaskKind},
    ascii,
    core::file_name,
};
use pixtag::{history::UndoManager, sidecar::Position};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};

const HIGHLIGHT: Style = Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD);

pub fn draw(f: &mut Frame, app: &App) {
    let base_chunks = Layout::default()
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Progress
            Constraint::Length(6), // Log view
            Constraint::Length(3), // Footer
        ])
        .split(f.area());

    let title = Paragraph::new(format!("Pixtag - {}", app.settings().input_dir().display()))
        .style(Style::default().fg(Color::LightCyan))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, base_chunks[0]);

    match app.current_screen() {
        CurrentScreen::SelectFolder => render_select_folder(f, app, base_chunks[1]),
        CurrentScreen::Browse => render_browse(f, app, base_chunks[1]),
        CurrentScreen::Stats => render_stats(f, app, base_chunks[1]),
        CurrentScreen::Settings => render_settings(f, app, base_chunks[1]),
        CurrentScreen::Exiting => {}
    }

    render_progress(f, app, base_chunks[2]);
    render_log(f, app, base_chunks[3]);

    let footer = Paragraph::new(footer_text(app))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, base_chunks[4]);

    if app.input().is_some() {
        render_input_popup(f, app);
    }
    if app.overwrite.is_some() {
        render_overwrite_popup(f, app);
    }
}

fn footer_text(app: &App) -> &'static str {
    if app.overwrite.is_some() {
        return "o: overwrite  s: skip  a: overwrite all  n: skip all  Esc: stop";
    }
    if app.input().is_some() {
        return "Enter: save  Esc: cancel";
    }
    match app.current_screen() {
        CurrentScreen::SelectFolder => "↑/↓ select  Enter: open  e: type a path  q: quit",
        CurrentScreen::Browse => {
            "Tab: focus  ↑↓←→: move  +: add tag  x: delete tag  u/r: undo/redo  t: tag  D: download  s: stats  o: settings  f: folder  Esc: stop  q: quit"
        }
        CurrentScreen::Stats => {
            "↑/↓ select  p/a: bulk prepend/append  x: delete from all files  u/r: undo/redo  R: refresh  Esc: back"
        }
        CurrentScreen::Settings => "↑/↓ select  Enter: edit or toggle  Esc: back",
        CurrentScreen::Exiting => "",
    }
}

fn focused_block(title: String, focused: bool) -> Block<'static> {
    let block = Block::default().borders(Borders::ALL).title(title);
    if focused {
        block.border_style(Style::default().fg(Color::Yellow))
    } else {
        block
    }
}

fn render_select_folder(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .suggested_dirs
        .iter()
        .map(|dir| ListItem::new(dir.to_string_lossy().into_owned()))
        .collect();

    let title = if items.is_empty() {
        "No image folders found below the current directory".to_string()
    } else {
        "Image folders".to_string()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(HIGHLIGHT)
        .highlight_symbol(">> ");

    let mut state = ListState::default().with_selected(Some(app.suggestion_index));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_browse(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(columns[1]);

    render_image_list(f, app, columns[0]);
    render_preview(f, app, right[0]);
    render_tag_grid(f, app, right[1]);
}

fn render_image_list(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .images
        .iter()
        .map(|path| {
            let tagged = pixtag::sidecar::sidecar_path(path).is_file();
            let marker = if tagged { "● " } else { "  " };
            ListItem::new(format!("{}{}", marker, file_name(path)))
        })
        .collect();

    let title = format!("Images ({})", app.images.len());
    let list = List::new(items)
        .block(focused_block(title, app.focus == Focus::Images))
        .highlight_style(HIGHLIGHT)
        .highlight_symbol(">> ");

    let selected = (!app.images.is_empty()).then_some(app.image_index);
    let mut state = ListState::default().with_selected(selected);
    f.render_stateful_widget(list, area, &mut state);
}

fn render_preview(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.current_image() {
        Some(path) => format!(
            "{} - Image {}/{}",
            file_name(path),
            app.image_index + 1,
            app.images.len()
        ),
        None => "Preview".to_string(),
    };

    let art = match &app.preview {
        Some(image) => {
            // Subtract border size from the area
            let inner_area = area.inner(Margin {
                vertical: 1,
                horizontal: 1,
            });
            ascii::create_ascii_art(image, inner_area)
        }
        None if app.current_image().is_some() => "Cannot decode image".to_string(),
        None => "No images in this folder".to_string(),
    };

    let preview = Paragraph::new(art)
        .block(Block::default().borders(Borders::ALL).title(title))
        .alignment(Alignment::Center);
    f.render_widget(preview, area);
}

/// First row and row count of the tag page holding `selected_row`.
///
/// Pages are `page_rows` tall, or less when the area is shorter.
fn tag_page(selected_row: usize, page_rows: usize, height: usize) -> (usize, usize) {
    let rows = page_rows.max(1).min(height.max(1));
    (selected_row / rows * rows, rows)
}

/// Tags laid out as pages of `Window.tag_display_rows` by `Window.tag_display_cols`.
fn render_tag_grid(f: &mut Frame, app: &App, area: Rect) {
    let window = &app.settings().window;
    let cols = window.tag_display_cols.max(1);
    let page_rows = window.tag_display_rows;
    let block = focused_block(
        format!("Tags ({})", app.tags.len()),
        app.focus == Focus::Tags,
    );
    let inner = block.inner(area);
    f.render_widget(block, area);

    if app.tags.is_empty() {
        f.render_widget(Paragraph::new("No tags"), inner);
        return;
    }

    let cell_width = (inner.width as usize / cols).max(1);
    let (first_row, visible_rows) = tag_page(app.tag_index / cols, page_rows, inner.height as usize);

    let lines: Vec<Line> = app
        .tags
        .chunks(cols)
        .enumerate()
        .skip(first_row)
        .take(visible_rows)
        .map(|(row, tags)| {
            let spans: Vec<Span> = tags
                .iter()
                .enumerate()
                .map(|(col, tag)| {
                    let index = row * cols + col;
                    let text = fit(tag, cell_width);
                    if app.focus == Focus::Tags && index == app.tag_index {
                        Span::styled(text, HIGHLIGHT.add_modifier(Modifier::REVERSED))
                    } else {
                        Span::raw(text)
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    f.render_widget(Paragraph::new(lines), inner);
}

/// Pads or cuts `text` to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count < width {
        format!("{:<width$}", text, width = width)
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(2)).collect();
        cut.push('…');
        cut.push(' ');
        cut
    }
}

fn render_stats(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let (items, title) = match &app.stats {
        Some(stats) => {
            let items: Vec<ListItem> = stats
                .counts
                .iter()
                .map(|(tag, count)| ListItem::new(format!("{:>6}  {}", count, tag)))
                .collect();
            let title = format!(
                "Tags in {} files ({} distinct){}",
                stats.files,
                stats.counts.len(),
                if stats.stopped { " - incomplete" } else { "" }
            );
            (items, title)
        }
        None => (Vec::new(), "Counting tags...".to_string()),
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(HIGHLIGHT)
        .highlight_symbol(">> ");
    let mut state = ListState::default().with_selected(Some(app.stats_index));
    f.render_stateful_widget(list, columns[0], &mut state);

    render_history(f, app, columns[1]);
}

fn render_history(f: &mut Frame, app: &App, area: Rect) {
    let history = app.history();
    let mut items: Vec<ListItem> = history
        .undo_entries()
        .map(|a| ListItem::new(format!("undo  {}", a.description())))
        .collect();
    items.extend(
        history
            .redo_entries()
            .map(|a| ListItem::new(format!("redo  {}", a.description())).style(Style::default().fg(Color::DarkGray))),
    );

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(history_title(history)));
    f.render_widget(list, area);
}

fn history_title(history: &UndoManager) -> String {
    let mut title = String::from("History");
    if let Some(next) = history.undo_description() {
        title.push_str(&format!(" | u: {}", next));
    }
    if let Some(next) = history.redo_description() {
        title.push_str(&format!(" | r: {}", next));
    }
    title
}

fn render_settings(f: &mut Frame, app: &App, area: Rect) {
    let settings = app.settings();
    let items: Vec<ListItem> = SettingItem::ALL
        .iter()
        .map(|item| ListItem::new(format!("{:<24} {}", item.label(), item.value(settings))))
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Settings"))
        .highlight_style(HIGHLIGHT)
        .highlight_symbol(">> ");
    let mut state = ListState::default().with_selected(Some(app.settings_index));
    f.render_stateful_widget(list, area, &mut state);
}

fn render_progress(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.running_task() {
        Some(TaskKind::Tagging) => "Tagging",
        Some(TaskKind::Download) => "Download",
        Some(TaskKind::Bulk) => "Bulk edit",
        Some(TaskKind::Stats) => "Counting tags",
        None => "Status",
    };
    let color = if app.is_error { Color::Red } else { Color::Green };

    let gauge = Gauge::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .ratio(app.progress.clamp(0.0, 1.0))
        .label(format!("{} ({:.1}%)", app.status_message, app.progress * 100.0));
    f.render_widget(gauge, area);
}

fn render_input_popup(f: &mut Frame, app: &App) {
    let popup_title = match app.input() {
        Some(InputKind::AddTag) => "Add tags (comma separated)".to_string(),
        Some(InputKind::BulkAdd(Position::Prepend)) => "Prepend tags to every file".to_string(),
        Some(InputKind::BulkAdd(Position::Append)) => "Append tags to every file".to_string(),
        Some(InputKind::Setting(item)) => format!("Edit {}", item.label()),
        None => "Editing".to_string(),
    };

    let block = Block::default()
        .title(popup_title)
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::DarkGray));
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area); //this clears the background
    f.render_widget(block, area);

    let popup_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([Constraint::Min(1), Constraint::Length(1)].as_ref())
        .split(area);

    let text_input = Paragraph::new(app.input_text())
        .style(Style::default().fg(Color::White))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(text_input, popup_chunks[0]);

    let help_text = Paragraph::new("Press <Enter> to save, <Esc> to cancel")
        .style(Style::default().fg(Color::LightYellow));
    f.render_widget(help_text, popup_chunks[1]);
}

fn render_overwrite_popup(f: &mut Frame, app: &App) {
    let Some(pending) = &app.overwrite else { return };

    let block = Block::default()
        .title("Tag file exists")
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::DarkGray).fg(Color::Yellow));
    let area = centered_rect(70, 30, f.area());
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let popup_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([Constraint::Min(1), Constraint::Length(1)].as_ref())
        .split(area);

    let message = Paragraph::new(format!(
        "{} already exists.\nOverwrite it with the new tags?",
        pending.sidecar.display()
    ))
    .wrap(Wrap { trim: false })
    .style(Style::default().fg(Color::White));
    f.render_widget(message, popup_chunks[0]);

    let help_text = Paragraph::new("[o] Overwrite  [s] Skip  [a] Overwrite all  [n] Skip all")
        .style(Style::default().fg(Color::LightYellow));
    f.render_widget(help_text, popup_chunks[1]);
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.logs.len().saturating_sub(visible);
    let log_messages: Vec<ListItem> = app.logs[start..]
        .iter()
        .map(|msg| ListItem::new(msg.as_str()))
        .collect();

    let logs_list = List::new(log_messages)
        .block(Block::default().borders(Borders::ALL).title("Logs"));

    f.render_widget(logs_list, area);
}

/// Helper function to create a centered rect using up certain percentage of the available rect `r`
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fit_pads_and_cuts() {
        assert_eq!(fit("abc", 6), "abc   ");
        assert_eq!(fit("abcdefgh", 6), "abcd… ");
    }

    #[test]
    fn test_centered_rect() {
        let r = centered_rect(50, 50, Rect::new(0, 0, 100, 40));
        assert_eq!(r, Rect::new(25, 10, 50, 20));
    }

    #[test]
    fn test_tag_page() {
        assert_eq!(tag_page(0, 6, 20), (0, 6));
        assert_eq!(tag_page(13, 6, 20), (12, 6));
        // shorter than a page
        assert_eq!(tag_page(13, 6, 4), (12, 4));
        assert_eq!(tag_page(3, 0, 0), (3, 1));
    }

    #[test]
    fn test_history_title_names_next_steps() {
        let mut history = UndoManager::default();
        assert_eq!(history_title(&history), "History");

        history.push(pixtag::history::UndoAction::AddTags {
            file: "a.txt".into(),
            tags: vec!["sky".to_string()],
        });
        assert_eq!(history_title(&history), "History | u: add \"sky\"");
    }
}
