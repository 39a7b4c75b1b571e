//! Undo / redo of tag edits.
//!
//! Every edit made through the front ends is recorded as an `UndoAction`.
//! The `UndoManager` keeps a bounded undo stack and a redo stack and can be
//! saved as JSON next to the images, so separate CLI invocations share it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::sidecar::{self, Position};

pub const HISTORY_FILE_NAME: &str = ".pixtag-history.json";
pub const DEFAULT_MAX_HISTORY: usize = 50;

pub fn history_path(input_dir: &Path) -> PathBuf {
    input_dir.join(HISTORY_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoAction {
    AddTags {
        file: PathBuf,
        tags: Vec<String>,
    },
    RemoveTag {
        file: PathBuf,
        tag: String,
        index: usize,
    },
    BulkAdd {
        position: Position,
        /// Each file with the tags that were actually added to it.
        files: Vec<(PathBuf, Vec<String>)>,
    },
    BulkRemove {
        tag: String,
        /// Each file with the index the tag had before removal.
        files: Vec<(PathBuf, usize)>,
    },
}

fn ensure_exists(file: &Path) -> Result<()> {
    if !file.is_file() {
        bail!("Tag file {:?} no longer exists", file);
    }
    Ok(())
}

/// Runs `apply` on every file. Succeeds when at least one file succeeded.
fn apply_each<T, F>(files: &[(PathBuf, T)], mut apply: F) -> Result<()>
where
    F: FnMut(&Path, &T) -> Result<()>,
{
    let mut succeeded = 0;
    for (file, data) in files {
        match ensure_exists(file).and_then(|_| apply(file, data)) {
            Ok(()) => succeeded += 1,
            Err(e) => tracing::warn!("Skipping {:?}: {:#}", file, e),
        }
    }
    tracing::debug!("Processed {}/{} files", succeeded, files.len());
    if succeeded == 0 && !files.is_empty() {
        bail!("None of the {} files could be updated", files.len());
    }
    Ok(())
}

fn quote_tags(tags: &[String]) -> String {
    match tags.len() {
        0 => "no tags".to_string(),
        1..=3 => format!("\"{}\"", tags.join(", ")),
        n => format!("\"{}...\" ({} tags)", tags[..3].join(", "), n),
    }
}

impl UndoAction {
    pub fn undo(&self) -> Result<()> {
        match self {
            UndoAction::AddTags { file, tags } => {
                ensure_exists(file)?;
                sidecar::remove_tags(file, tags)
            }
            UndoAction::RemoveTag { file, tag, index } => {
                ensure_exists(file)?;
                sidecar::insert_tag(file, tag, *index)
            }
            UndoAction::BulkAdd { files, .. } => {
                apply_each(files, |file, tags| sidecar::remove_tags(file, tags))
            }
            UndoAction::BulkRemove { tag, files } => {
                apply_each(files, |file, index| sidecar::insert_tag(file, tag, *index))
            }
        }
    }

    pub fn redo(&self) -> Result<()> {
        match self {
            UndoAction::AddTags { file, tags } => {
                ensure_exists(file)?;
                sidecar::add_tags(file, tags).map(|_| ())
            }
            UndoAction::RemoveTag { file, tag, .. } => {
                ensure_exists(file)?;
                sidecar::remove_tag(file, tag).map(|_| ())
            }
            UndoAction::BulkAdd { position, files } => {
                apply_each(files, |file, tags| sidecar::merge_tags(file, tags, *position))
            }
            UndoAction::BulkRemove { tag, files } => apply_each(files, |file, _| {
                sidecar::remove_tags(file, std::slice::from_ref(tag))
            }),
        }
    }

    pub fn description(&self) -> String {
        match self {
            UndoAction::AddTags { tags, .. } => format!("add {}", quote_tags(tags)),
            UndoAction::RemoveTag { tag, .. } => format!("remove \"{}\"", tag),
            UndoAction::BulkAdd { files, .. } => {
                let mut tags: Vec<String> = files.iter().flat_map(|(_, t)| t.iter().cloned()).collect();
                tags.sort();
                tags.dedup();
                format!("bulk add {} ({} files)", quote_tags(&tags), files.len())
            }
            UndoAction::BulkRemove { tag, files } => {
                format!("bulk remove \"{}\" ({} files)", tag, files.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoManager {
    undo_stack: Vec<UndoAction>,
    redo_stack: Vec<UndoAction>,
    max_history: usize,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl UndoManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    /// Records a new action and forgets everything that could be redone.
    pub fn push(&mut self, action: UndoAction) {
        tracing::debug!("Recorded: {}", action.description());
        self.undo_stack.push(action);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_history {
            let removed = self.undo_stack.remove(0);
            tracing::debug!("History full, dropped: {}", removed.description());
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undoes the latest action and returns its description.
    ///
    /// `Ok(None)` when there is nothing to undo. An action whose undo fails
    /// is discarded and does not become redoable.
    pub fn undo(&mut self) -> Result<Option<String>> {
        let Some(action) = self.undo_stack.pop() else {
            return Ok(None);
        };
        let description = action.description();
        action
            .undo()
            .with_context(|| format!("Undo of {} failed", description))?;
        self.redo_stack.push(action);
        tracing::info!("Undone: {}", description);
        Ok(Some(description))
    }

    /// Redoes the latest undone action and returns its description.
    pub fn redo(&mut self) -> Result<Option<String>> {
        let Some(action) = self.redo_stack.pop() else {
            return Ok(None);
        };
        let description = action.description();
        action
            .redo()
            .with_context(|| format!("Redo of {} failed", description))?;
        self.undo_stack.push(action);
        tracing::info!("Redone: {}", description);
        Ok(Some(description))
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.last().map(UndoAction::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(UndoAction::description)
    }

    /// Undoable actions, newest first.
    pub fn undo_entries(&self) -> impl Iterator<Item = &UndoAction> {
        self.undo_stack.iter().rev()
    }

    pub fn redo_entries(&self) -> impl Iterator<Item = &UndoAction> {
        self.redo_stack.iter().rev()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Loads a saved history; a missing file gives an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read history {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse history {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write history {:?}", path))
    }
}
