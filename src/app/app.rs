//! TUI state and input handling.
//!
//! The `App` owns the settings, the folder being edited and its undo history.
//! Long operations run through `core` and report back over a channel that the
//! main loop drains between frames.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use image::DynamicImage;
use ratatui::{backend::Backend, Terminal};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use pixtag::{
    bulk::TagStatistics,
    config::Settings,
    file::ModelFiles,
    history::{history_path, UndoAction, UndoManager},
    job::{JobEvent, OverwriteDecision, StopFlag},
    media, sidecar,
    sidecar::Position,
    tag::parse_tag_input,
};

use crate::{
    core::{self, describe_event, file_name, ProgressUpdate},
    ui,
};

const MAX_LOGS: usize = 100;

/// Represents the different screens in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentScreen {
    SelectFolder,
    Browse,
    Stats,
    Settings,
    Exiting,
}

/// Which list of the browse screen receives the arrow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Images,
    Tags,
}

/// What the text input popup is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    AddTag,
    BulkAdd(Position),
    Setting(SettingItem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Tagging,
    Download,
    Bulk,
    Stats,
}

/// The editable entries of the settings screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingItem {
    GeneralThreshold,
    CharacterThreshold,
    GeneralLimit,
    CharacterLimit,
    SoloCharacterLimit,
    ConvertUnderscore,
    InputDir,
}

impl SettingItem {
    pub const ALL: [SettingItem; 7] = [
        SettingItem::GeneralThreshold,
        SettingItem::CharacterThreshold,
        SettingItem::GeneralLimit,
        SettingItem::CharacterLimit,
        SettingItem::SoloCharacterLimit,
        SettingItem::ConvertUnderscore,
        SettingItem::InputDir,
    ];

    /// Section and key in `config.ini`.
    pub fn key(self) -> (&'static str, &'static str) {
        match self {
            SettingItem::GeneralThreshold => ("Thresholds", "general"),
            SettingItem::CharacterThreshold => ("Thresholds", "character"),
            SettingItem::GeneralLimit => ("Limits", "general"),
            SettingItem::CharacterLimit => ("Limits", "character"),
            SettingItem::SoloCharacterLimit => ("Behavior", "enable_solo_character_limit"),
            SettingItem::ConvertUnderscore => ("Behavior", "convert_underscore_to_space"),
            SettingItem::InputDir => ("Paths", "input_dir"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SettingItem::GeneralThreshold => "General threshold",
            SettingItem::CharacterThreshold => "Character threshold",
            SettingItem::GeneralLimit => "Max general tags",
            SettingItem::CharacterLimit => "Max character tags",
            SettingItem::SoloCharacterLimit => "Solo character limit",
            SettingItem::ConvertUnderscore => "Underscores to spaces",
            SettingItem::InputDir => "Input folder",
        }
    }

    pub fn value(self, settings: &Settings) -> String {
        let on_off = |b: bool| if b { "On" } else { "Off" }.to_string();
        match self {
            SettingItem::GeneralThreshold => format!("{:.2}", settings.thresholds.general),
            SettingItem::CharacterThreshold => format!("{:.2}", settings.thresholds.character),
            SettingItem::GeneralLimit => settings.limits.general.to_string(),
            SettingItem::CharacterLimit => settings.limits.character.to_string(),
            SettingItem::SoloCharacterLimit => on_off(settings.behavior.enable_solo_character_limit),
            SettingItem::ConvertUnderscore => on_off(settings.behavior.convert_underscore_to_space),
            SettingItem::InputDir => settings.paths.input_dir.clone(),
        }
    }

    fn is_toggle(self) -> bool {
        matches!(
            self,
            SettingItem::SoloCharacterLimit | SettingItem::ConvertUnderscore
        )
    }
}

struct RunningTask {
    kind: TaskKind,
    stop: StopFlag,
    rx: mpsc::Receiver<ProgressUpdate>,
}

/// An overwrite question from a tagging run, waiting for a key press.
pub struct PendingOverwrite {
    pub sidecar: PathBuf,
    reply: oneshot::Sender<OverwriteDecision>,
}

/// The main application struct, holding the state of the TUI.
pub struct App {
    settings: Settings,
    config_path: PathBuf,
    current_screen: CurrentScreen,
    pub focus: Focus,
    input: Option<InputKind>,
    input_text: String,
    task: Option<RunningTask>,
    pub overwrite: Option<PendingOverwrite>,
    pub progress: f64,
    pub status_message: String,
    pub is_error: bool,
    pub logs: Vec<String>,
    history: UndoManager,
    pub images: Vec<PathBuf>,
    pub image_index: usize,
    pub preview: Option<DynamicImage>,
    pub tags: Vec<String>,
    pub tag_index: usize,
    pub stats: Option<TagStatistics>,
    pub stats_index: usize,
    pub settings_index: usize,
    pub suggested_dirs: Vec<PathBuf>,
    pub suggestion_index: usize,
}

impl App {
    pub fn new(settings: Settings, config_path: PathBuf) -> Self {
        let mut app = Self {
            settings,
            config_path,
            current_screen: CurrentScreen::Browse,
            focus: Focus::Images,
            input: None,
            input_text: String::new(),
            task: None,
            overwrite: None,
            progress: 0.0,
            status_message: String::from("Ready."),
            is_error: false,
            logs: Vec::new(),
            history: UndoManager::default(),
            images: Vec::new(),
            image_index: 0,
            preview: None,
            tags: Vec::new(),
            tag_index: 0,
            stats: None,
            stats_index: 0,
            settings_index: 0,
            suggested_dirs: Vec::new(),
            suggestion_index: 0,
        };
        app.open_folder();
        if !ModelFiles::is_available(&app.settings) {
            app.log("Model not found. Press 'D' to download it.");
        }
        app
    }

    /// Runs the main application loop.
    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        while self.current_screen != CurrentScreen::Exiting {
            terminal.draw(|f| ui::draw(f, self))?;
            self.handle_events()?;
            self.handle_progress_updates();
        }
        if let Some(task) = &self.task {
            task.stop.stop();
        }
        Ok(())
    }

    /// Writes the settings back to `config.ini`.
    ///
    /// `Model.verified` is written by the download and the tagger directly, so
    /// the value on disk wins over the one loaded at startup.
    pub fn save_settings(&mut self) -> Result<()> {
        if let Ok(on_disk) = Settings::load(&self.config_path) {
            self.settings.model.verified = on_disk.model.verified;
        }
        self.settings.save(&self.config_path)
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.status_message = message.clone();
        self.logs.push(message);
        if self.logs.len() > MAX_LOGS {
            self.logs.remove(0);
        }
    }

    fn log_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.is_error = true;
        self.log(format!("Error: {}", message));
    }

    // Folder and image state

    fn open_folder(&mut self) {
        let dir = self.settings.input_dir();
        self.history = UndoManager::load(&history_path(&dir)).unwrap_or_else(|e| {
            warn!("Ignoring unreadable history: {:#}", e);
            UndoManager::default()
        });
        self.stats = None;
        self.stats_index = 0;

        match media::find_images(&dir) {
            Ok(images) => {
                self.images = images;
                self.image_index = 0;
                self.current_screen = CurrentScreen::Browse;
                self.log(format!("{}: {} images", dir.display(), self.images.len()));
            }
            Err(e) => {
                self.images.clear();
                self.log_error(format!("{:#}", e));
                self.show_folder_suggestions();
            }
        }
        self.load_current_image();
    }

    fn show_folder_suggestions(&mut self) {
        self.suggested_dirs = media::suggest_image_directories(Path::new(".")).unwrap_or_default();
        self.suggestion_index = 0;
        self.current_screen = CurrentScreen::SelectFolder;
    }

    pub fn current_image(&self) -> Option<&Path> {
        self.images.get(self.image_index).map(PathBuf::as_path)
    }

    fn load_current_image(&mut self) {
        self.preview = self.current_image().and_then(|p| image::open(p).ok());
        self.reload_tags();
    }

    fn reload_tags(&mut self) {
        self.tags = match self.current_image() {
            Some(image) => match sidecar::read_tags(&sidecar::sidecar_path(image)) {
                Ok(tags) => tags,
                Err(e) => {
                    self.log_error(format!("{:#}", e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.tag_index = self.tag_index.min(self.tags.len().saturating_sub(1));
    }

    fn select_image(&mut self, index: usize) {
        if self.images.is_empty() {
            return;
        }
        let index = index.min(self.images.len() - 1);
        if index != self.image_index {
            self.image_index = index;
            self.tag_index = 0;
            self.load_current_image();
        }
    }

    fn record(&mut self, action: UndoAction) {
        self.history.push(action);
        self.save_history();
    }

    fn save_history(&mut self) {
        let path = history_path(&self.settings.input_dir());
        if let Err(e) = self.history.save(&path) {
            self.log_error(format!("Failed to save history: {:#}", e));
        }
    }

    // Event handling

    /// Handles user input events.
    fn handle_events(&mut self) -> io::Result<()> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if self.overwrite.is_some() {
                        self.handle_overwrite_events(key.code);
                    } else if self.input.is_some() {
                        self.handle_input_events(key.code);
                    } else {
                        match self.current_screen {
                            CurrentScreen::SelectFolder => self.handle_select_folder_events(key.code),
                            CurrentScreen::Browse => self.handle_browse_events(key.code),
                            CurrentScreen::Stats => self.handle_stats_events(key.code),
                            CurrentScreen::Settings => self.handle_settings_events(key.code),
                            CurrentScreen::Exiting => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_overwrite_events(&mut self, key_code: KeyCode) {
        let decision = match key_code {
            KeyCode::Char('o') | KeyCode::Char('y') => OverwriteDecision::Overwrite,
            KeyCode::Char('s') => OverwriteDecision::Skip,
            KeyCode::Char('a') => OverwriteDecision::OverwriteAll,
            KeyCode::Char('n') => OverwriteDecision::SkipAll,
            KeyCode::Esc => {
                self.stop_task();
                OverwriteDecision::Skip
            }
            _ => return,
        };
        if let Some(pending) = self.overwrite.take() {
            let _ = pending.reply.send(decision);
        }
    }

    fn handle_input_events(&mut self, key_code: KeyCode) {
        match key_code {
            KeyCode::Enter => self.finish_input(),
            KeyCode::Char(c) => self.input_text.push(c),
            KeyCode::Backspace => {
                self.input_text.pop();
            }
            KeyCode::Esc => {
                self.input = None;
                self.input_text.clear();
            }
            _ => {}
        }
    }

    fn handle_select_folder_events(&mut self, key_code: KeyCode) {
        match key_code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.suggestion_index = self.suggestion_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if !self.suggested_dirs.is_empty() {
                    self.suggestion_index =
                        (self.suggestion_index + 1).min(self.suggested_dirs.len() - 1);
                }
            }
            KeyCode::Enter => {
                if let Some(dir) = self.suggested_dirs.get(self.suggestion_index).cloned() {
                    self.settings.paths.input_dir = dir.to_string_lossy().into_owned();
                    self.open_folder();
                }
            }
            KeyCode::Char('e') => self.start_input(InputKind::Setting(SettingItem::InputDir)),
            KeyCode::Esc if !self.images.is_empty() => self.current_screen = CurrentScreen::Browse,
            KeyCode::Char('q') => self.current_screen = CurrentScreen::Exiting,
            _ => {}
        }
    }

    fn handle_browse_events(&mut self, key_code: KeyCode) {
        match key_code {
            KeyCode::Char('q') => self.current_screen = CurrentScreen::Exiting,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Images => Focus::Tags,
                    Focus::Tags => Focus::Images,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1, true),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1, true),
            KeyCode::Left | KeyCode::Char('h') => self.move_selection(-1, false),
            KeyCode::Right | KeyCode::Char('l') => self.move_selection(1, false),
            KeyCode::Char('+') | KeyCode::Char('i') => {
                if self.current_image().is_some() {
                    self.start_input(InputKind::AddTag);
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => self.delete_selected_tag(),
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char('r') => self.redo(),
            KeyCode::Char('t') => self.start_tagging(),
            KeyCode::Char('D') => self.start_download(),
            KeyCode::Char('s') => {
                self.current_screen = CurrentScreen::Stats;
                self.start_stats();
            }
            KeyCode::Char('o') => self.current_screen = CurrentScreen::Settings,
            KeyCode::Char('f') => self.show_folder_suggestions(),
            KeyCode::Esc => self.stop_task(),
            _ => {}
        }
    }

    /// Up/down walk the focused list. In the tag grid left/right step by
    /// one tag and up/down by one row; in the image list all four step images.
    fn move_selection(&mut self, delta: isize, vertical: bool) {
        match self.focus {
            Focus::Images => {
                let index = self.image_index.saturating_add_signed(delta);
                self.select_image(index);
            }
            Focus::Tags => {
                if self.tags.is_empty() {
                    return;
                }
                let step = if vertical {
                    self.settings.window.tag_display_cols.max(1) as isize
                } else {
                    1
                };
                let index = self.tag_index.saturating_add_signed(delta * step);
                self.tag_index = index.min(self.tags.len() - 1);
            }
        }
    }

    fn handle_stats_events(&mut self, key_code: KeyCode) {
        let len = self.stats.as_ref().map_or(0, |s| s.counts.len());
        match key_code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.stats_index = self.stats_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if len > 0 {
                    self.stats_index = (self.stats_index + 1).min(len - 1);
                }
            }
            KeyCode::Char('p') => self.start_input(InputKind::BulkAdd(Position::Prepend)),
            KeyCode::Char('a') => self.start_input(InputKind::BulkAdd(Position::Append)),
            KeyCode::Char('x') | KeyCode::Delete => self.start_bulk_remove(),
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char('r') => self.redo(),
            KeyCode::Char('R') => self.start_stats(),
            KeyCode::Esc => {
                if self.task.is_some() {
                    self.stop_task();
                } else {
                    self.current_screen = CurrentScreen::Browse;
                }
            }
            KeyCode::Char('q') => self.current_screen = CurrentScreen::Browse,
            _ => {}
        }
    }

    fn handle_settings_events(&mut self, key_code: KeyCode) {
        match key_code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.settings_index = self.settings_index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.settings_index = (self.settings_index + 1).min(SettingItem::ALL.len() - 1);
            }
            KeyCode::Enter => {
                let item = SettingItem::ALL[self.settings_index];
                if item.is_toggle() {
                    let (section, key) = item.key();
                    let flipped = if item.value(&self.settings) == "On" { "False" } else { "True" };
                    self.apply_setting(section, key, flipped);
                } else {
                    self.start_input(InputKind::Setting(item));
                }
            }
            KeyCode::Esc | KeyCode::Char('q') => self.current_screen = CurrentScreen::Browse,
            _ => {}
        }
    }

    // Text input

    fn start_input(&mut self, kind: InputKind) {
        self.input_text = match kind {
            InputKind::Setting(item) if !item.is_toggle() => item.value(&self.settings),
            _ => String::new(),
        };
        self.input = Some(kind);
    }

    fn finish_input(&mut self) {
        let Some(kind) = self.input.take() else { return };
        let text = std::mem::take(&mut self.input_text);
        match kind {
            InputKind::AddTag => self.add_tags(&text),
            InputKind::BulkAdd(position) => self.start_bulk_add(text, position),
            InputKind::Setting(item) => {
                let (section, key) = item.key();
                self.apply_setting(section, key, text.trim());
            }
        }
    }

    fn apply_setting(&mut self, section: &str, key: &str, value: &str) {
        let folder_before = self.settings.input_dir();
        match self.settings.set(section, key, value) {
            Ok(()) => {
                self.is_error = false;
                self.log(format!("[{}] {} = {}", section, key, value));
                if self.settings.input_dir() != folder_before {
                    self.open_folder();
                }
            }
            Err(e) => self.log_error(e.to_string()),
        }
    }

    // Single image edits

    fn add_tags(&mut self, text: &str) {
        let Some(image) = self.current_image() else { return };
        let tags = parse_tag_input(text);
        if tags.is_empty() {
            return;
        }
        let file = sidecar::sidecar_path(image);
        match sidecar::add_tags(&file, &tags) {
            Ok(added) if added.is_empty() => self.log("All tags are already present."),
            Ok(added) => {
                self.log(format!("Added {}", added.join(", ")));
                self.record(UndoAction::AddTags { file, tags: added });
                self.reload_tags();
            }
            Err(e) => self.log_error(format!("{:#}", e)),
        }
    }

    fn delete_selected_tag(&mut self) {
        if self.focus != Focus::Tags {
            return;
        }
        let (Some(image), Some(tag)) = (self.current_image(), self.tags.get(self.tag_index)) else {
            return;
        };
        let file = sidecar::sidecar_path(image);
        let tag = tag.clone();
        match sidecar::remove_tag(&file, &tag) {
            Ok(Some(index)) => {
                self.log(format!("Removed {}", tag));
                self.record(UndoAction::RemoveTag { file, tag, index });
                self.reload_tags();
            }
            Ok(None) => self.reload_tags(),
            Err(e) => self.log_error(format!("{:#}", e)),
        }
    }

    fn undo(&mut self) {
        let result = self.history.undo();
        self.after_history_step(result, "Undid", "undo");
    }

    fn redo(&mut self) {
        let result = self.history.redo();
        self.after_history_step(result, "Redid", "redo");
    }

    fn after_history_step(&mut self, result: Result<Option<String>>, done: &str, verb: &str) {
        self.save_history();
        match result {
            Ok(Some(description)) => {
                self.is_error = false;
                self.log(format!("{} {}", done, description));
            }
            Ok(None) => self.log(format!("Nothing to {}.", verb)),
            Err(e) => self.log_error(format!("Failed to {}: {:#}", verb, e)),
        }
        self.reload_tags();
        if self.stats.is_some() {
            self.start_stats();
        }
    }

    // Background tasks

    fn start_task(&mut self, kind: TaskKind) -> Option<(StopFlag, mpsc::Sender<ProgressUpdate>)> {
        if let Some(task) = &self.task {
            let busy = format!("Busy with {:?}, press Esc to stop it first.", task.kind);
            self.log(busy);
            return None;
        }
        let (tx, rx) = mpsc::channel(100);
        let stop = StopFlag::new();
        self.task = Some(RunningTask {
            kind,
            stop: stop.clone(),
            rx,
        });
        self.progress = 0.0;
        self.is_error = false;
        Some((stop, tx))
    }

    pub fn running_task(&self) -> Option<TaskKind> {
        self.task.as_ref().map(|t| t.kind)
    }

    fn stop_task(&mut self) {
        if let Some(task) = &self.task {
            task.stop.stop();
            self.log("Stopping...");
        }
    }

    fn start_tagging(&mut self) {
        if !ModelFiles::is_available(&self.settings) {
            self.log_error("The model is not available. Press 'D' to download it.");
            return;
        }
        let selected = self.current_image().map(Path::to_path_buf);
        let Some((stop, tx)) = self.start_task(TaskKind::Tagging) else { return };
        self.log("Starting tagging...");
        let policy = core::ChannelPolicy::new(tx.clone());
        core::spawn_tagging(
            self.settings.clone(),
            self.config_path.clone(),
            self.settings.input_dir(),
            selected,
            policy,
            stop,
            tx,
        );
    }

    fn start_download(&mut self) {
        let Some((stop, tx)) = self.start_task(TaskKind::Download) else { return };
        self.log("Starting model download...");
        core::spawn_download(self.settings.clone(), self.config_path.clone(), stop, tx);
    }

    fn start_stats(&mut self) {
        let Some((stop, tx)) = self.start_task(TaskKind::Stats) else { return };
        core::spawn_stats(self.settings.input_dir(), stop, tx);
    }

    fn start_bulk_add(&mut self, input: String, position: Position) {
        if parse_tag_input(&input).is_empty() {
            return;
        }
        let Some((stop, tx)) = self.start_task(TaskKind::Bulk) else { return };
        core::spawn_bulk_add(self.settings.input_dir(), input, position, stop, tx);
    }

    fn start_bulk_remove(&mut self) {
        let Some(tag) = self
            .stats
            .as_ref()
            .and_then(|s| s.counts.get(self.stats_index))
            .map(|(tag, _)| tag.clone())
        else {
            return;
        };
        let Some((stop, tx)) = self.start_task(TaskKind::Bulk) else { return };
        core::spawn_bulk_remove(self.settings.input_dir(), tag, stop, tx);
    }

    /// Handles progress updates from the background task.
    fn handle_progress_updates(&mut self) {
        loop {
            let Some(task) = self.task.as_mut() else { return };
            let update = match task.rx.try_recv() {
                Ok(update) => update,
                Err(mpsc::error::TryRecvError::Empty) => return,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.finish_task();
                    return;
                }
            };
            self.apply_update(update);
        }
    }

    fn finish_task(&mut self) {
        self.task = None;
        if let Some(pending) = self.overwrite.take() {
            let _ = pending.reply.send(OverwriteDecision::SkipAll);
        }
    }

    fn apply_update(&mut self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Message(msg) => self.log(msg),
            ProgressUpdate::Job(event) => self.apply_job_event(event),
            ProgressUpdate::Overwrite { sidecar, reply } => {
                self.overwrite = Some(PendingOverwrite { sidecar, reply });
            }
            ProgressUpdate::Download(p) => {
                self.progress = p.percent as f64 / 100.0;
                self.status_message = format!(
                    "{}: {:.1} / {:.1} MB",
                    p.file_name, p.downloaded_mb, p.total_mb
                );
            }
            ProgressUpdate::DownloadFinished(result) => {
                match result {
                    Ok(()) => {
                        self.progress = 1.0;
                        self.settings.model.verified = true;
                        self.log("Model downloaded and verified.");
                    }
                    Err(e) => self.log_error(format!("Download failed: {}", e)),
                }
                self.finish_task();
            }
            ProgressUpdate::BulkFinished { action, message } => {
                self.log(message);
                if let Some(action) = action {
                    self.record(action);
                }
                self.finish_task();
                self.reload_tags();
                self.start_stats();
            }
            ProgressUpdate::Stats(stats) => {
                self.stats_index = self.stats_index.min(stats.counts.len().saturating_sub(1));
                self.log(format!(
                    "{} tag files, {} distinct tags",
                    stats.files,
                    stats.counts.len()
                ));
                self.stats = Some(stats);
                self.finish_task();
            }
            ProgressUpdate::Error(e) => {
                self.log_error(e);
                self.finish_task();
            }
        }
    }

    fn apply_job_event(&mut self, event: JobEvent) {
        let line = describe_event(&event);
        match &event {
            JobEvent::Processing { index, total, path } => {
                self.progress = *index as f64 / (*total).max(1) as f64;
                self.status_message = format!("[{}/{}] {}", index + 1, total, file_name(path));
                return;
            }
            JobEvent::Written { path, .. } => {
                if self.current_image() == Some(path.as_path()) {
                    self.reload_tags();
                }
            }
            JobEvent::Failed { .. } => self.is_error = true,
            JobEvent::Finished(_) => self.progress = 1.0,
            _ => {}
        }
        self.log(line);
        if matches!(event, JobEvent::Finished(_)) {
            self.finish_task();
        }
    }

    // Accessors
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn current_screen(&self) -> CurrentScreen {
        self.current_screen
    }
    pub fn input(&self) -> Option<InputKind> {
        self.input
    }
    pub fn input_text(&self) -> &str {
        &self.input_text
    }
    pub fn history(&self) -> &UndoManager {
        &self.history
    }
}
