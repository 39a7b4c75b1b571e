//! Folder-wide tag editing and tag statistics.
//!
//! All operations visit every `.txt` file below the folder. A file that cannot
//! be read or written is logged and left alone; the run goes on.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Result;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    error::TaggerError,
    job::StopFlag,
    media,
    sidecar::{self, Position},
    tag::parse_tag_set,
};

/// Files changed by a bulk operation, with what is needed to undo each change.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome<T> {
    pub changed: Vec<(PathBuf, T)>,
    pub failed: usize,
    pub stopped: bool,
}

impl<T> Default for BulkOutcome<T> {
    fn default() -> Self {
        Self {
            changed: Vec::new(),
            failed: 0,
            stopped: false,
        }
    }
}

impl<T> BulkOutcome<T> {
    pub fn modified(&self) -> usize {
        self.changed.len()
    }
}

fn tag_set(tags: &[String]) -> HashSet<&str> {
    tags.iter().map(String::as_str).collect()
}

/// Applies `edit` to one file and writes it when the set of tags changed.
///
/// Returns the original tags when the file was rewritten.
fn edit_file<F>(path: &Path, edit: F) -> Result<Option<Vec<String>>>
where
    F: FnOnce(&[String]) -> Vec<String>,
{
    let existing = sidecar::read_tags(path)?;
    let updated = edit(&existing);
    if tag_set(&existing) == tag_set(&updated) {
        return Ok(None);
    }
    sidecar::write_tags(path, &updated)?;
    Ok(Some(existing))
}

fn for_each_tag_file<T, F>(dir: &Path, stop: &StopFlag, mut visit: F) -> Result<BulkOutcome<T>>
where
    F: FnMut(&Path) -> Result<Option<T>>,
{
    let mut outcome = BulkOutcome::default();
    for path in media::find_tag_files(dir)? {
        if stop.is_stopped() {
            outcome.stopped = true;
            break;
        }
        match visit(&path) {
            Ok(Some(undo)) => outcome.changed.push((path, undo)),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Failed to process {:?}: {:#}", path, e);
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

/// Adds the comma-separated `input` tags to every tag file below `dir`.
///
/// Each changed file is reported with the tags actually added to it.
pub fn bulk_add(
    dir: &Path,
    input: &str,
    position: Position,
    stop: &StopFlag,
) -> Result<BulkOutcome<Vec<String>>> {
    let new_tags = parse_tag_set(input);
    if new_tags.is_empty() {
        return Err(TaggerError::EmptyTagInput.into());
    }
    tracing::info!("Bulk add of {:?} ({:?}) in {:?}", new_tags, position, dir);

    let outcome = for_each_tag_file(dir, stop, |path| {
        let original = edit_file(path, |existing| sidecar::merge(existing, &new_tags, position))?;
        Ok(original.map(|existing| {
            new_tags
                .iter()
                .filter(|t| !existing.contains(t))
                .cloned()
                .collect::<Vec<_>>()
        }))
    })?;

    tracing::info!("Bulk add modified {} files", outcome.modified());
    Ok(outcome)
}

/// Removes every occurrence of `tag` from every tag file below `dir`.
///
/// Each changed file is reported with the index of the first occurrence.
pub fn bulk_remove(dir: &Path, tag: &str, stop: &StopFlag) -> Result<BulkOutcome<usize>> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(TaggerError::EmptyTagInput.into());
    }
    tracing::info!("Bulk delete of {:?} in {:?}", tag, dir);

    let outcome = for_each_tag_file(dir, stop, |path| {
        let original = edit_file(path, |existing| {
            existing.iter().filter(|t| *t != tag).cloned().collect()
        })?;
        Ok(original.and_then(|existing| existing.iter().position(|t| t == tag)))
    })?;

    tracing::info!("Bulk delete modified {} files", outcome.modified());
    Ok(outcome)
}

/// Tag usage across a folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagStatistics {
    /// Most common first; ties keep the order the tags were first seen.
    pub counts: Vec<(String, usize)>,
    pub files: usize,
    pub stopped: bool,
}

pub fn tag_statistics(dir: &Path, stop: &StopFlag) -> Result<TagStatistics> {
    let mut counter: IndexMap<String, usize> = IndexMap::new();
    let mut stats = TagStatistics::default();

    for path in media::find_tag_files(dir)? {
        if stop.is_stopped() {
            stats.stopped = true;
            break;
        }
        match sidecar::read_tags(&path) {
            Ok(tags) => {
                stats.files += 1;
                for tag in tags {
                    *counter.entry(tag).or_insert(0) += 1;
                }
            }
            Err(e) => tracing::warn!("Skipping unreadable {:?}: {:#}", path, e),
        }
    }

    stats.counts = counter
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1))
        .collect();
    Ok(stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_edit_file_ignores_reordering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "a, b").unwrap();

        let result = edit_file(&path, |tags| tags.iter().rev().cloned().collect()).unwrap();
        assert!(result.is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a, b");
    }

    #[test]
    fn test_empty_input_rejected() {
        let dir = tempdir().unwrap();
        let stop = StopFlag::new();
        let err = bulk_add(dir.path(), " , ", Position::Append, &stop).unwrap_err();
        assert!(matches!(err.downcast_ref::<TaggerError>(), Some(TaggerError::EmptyTagInput)));
        assert!(bulk_remove(dir.path(), "  ", &stop).is_err());
    }
}
