//! Sidecar tag files.
//!
//! Every image `foo.png` owns at most one `foo.txt` next to it holding a
//! comma-separated tag list. Writes go through a temporary file in the same
//! directory and replace the old file in one rename.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::Builder;

/// Where new tags go when merged into an existing list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Prepend,
    Append,
}

/// Path of the tag file belonging to `image_path`.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("txt")
}

pub fn parse_tags(content: &str) -> Vec<String> {
    content
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn format_tag_line(tags: &[String]) -> String {
    tags.join(", ")
}

/// Reads the tags of a sidecar file. A missing file has no tags.
pub fn read_tags(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tag file {:?}", path))?;
    Ok(parse_tags(&content))
}

/// Replaces the content of a sidecar file with `tags`.
///
/// An existing file keeps its permissions; a new one gets the usual mode for
/// the current umask.
pub fn write_tags(path: &Path, tags: &[String]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut temp_file = builder
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp_file.path(), metadata.permissions())
            .with_context(|| format!("Failed to copy permissions of {:?}", path))?;
    }
    temp_file.write_all(format_tag_line(tags).as_bytes())?;
    temp_file
        .persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write tag file {:?}", path))?;
    Ok(())
}

/// Appends the tags that are not in the file yet and returns them.
///
/// Nothing is written when every tag is already present.
pub fn add_tags(path: &Path, tags: &[String]) -> Result<Vec<String>> {
    let mut existing = read_tags(path)?;
    let mut added = Vec::new();
    for tag in tags {
        if !existing.contains(tag) && !added.contains(tag) {
            added.push(tag.clone());
        }
    }
    if !added.is_empty() {
        existing.extend(added.iter().cloned());
        write_tags(path, &existing)?;
    }
    Ok(added)
}

/// Removes the first occurrence of `tag` and returns where it was.
pub fn remove_tag(path: &Path, tag: &str) -> Result<Option<usize>> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut tags = read_tags(path)?;
    match tags.iter().position(|t| t == tag) {
        Some(index) => {
            tags.remove(index);
            write_tags(path, &tags)?;
            Ok(Some(index))
        }
        None => Ok(None),
    }
}

/// Inserts `tag` at `index`, clamped to the end of the list.
pub fn insert_tag(path: &Path, tag: &str, index: usize) -> Result<()> {
    let mut tags = read_tags(path)?;
    let index = index.min(tags.len());
    tags.insert(index, tag.to_string());
    write_tags(path, &tags)
}

/// Removes the first occurrence of each of `to_remove`.
pub fn remove_tags(path: &Path, to_remove: &[String]) -> Result<()> {
    let mut tags = read_tags(path)?;
    for tag in to_remove {
        if let Some(index) = tags.iter().position(|t| t == tag) {
            tags.remove(index);
        }
    }
    write_tags(path, &tags)
}

/// New tags that are not in `existing`, placed at `position`.
pub fn merge(existing: &[String], new_tags: &[String], position: Position) -> Vec<String> {
    let fresh = new_tags
        .iter()
        .filter(|t| !existing.contains(t))
        .cloned();
    match position {
        Position::Prepend => fresh.chain(existing.iter().cloned()).collect(),
        Position::Append => existing.iter().cloned().chain(fresh).collect(),
    }
}

/// Merges `tags` into the file at `position`.
pub fn merge_tags(path: &Path, tags: &[String], position: Position) -> Result<()> {
    let existing = read_tags(path)?;
    write_tags(path, &merge(&existing, tags, position))
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(sidecar_path(Path::new("dir/img.001.png")), PathBuf::from("dir/img.001.txt"));
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("  a, b ,,c , \n"), strings(&["a", "b", "c"]));
        assert!(parse_tags("   ").is_empty());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(read_tags(&dir.path().join("missing.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write_tags(&path, &strings(&["1girl", "solo"])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1girl, solo");
        assert_eq!(read_tags(&path).unwrap(), strings(&["1girl", "solo"]));
    }

    #[test]
    fn test_add_tags_skips_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write_tags(&path, &strings(&["a", "b"])).unwrap();

        let added = add_tags(&path, &strings(&["b", "c", "c"])).unwrap();
        assert_eq!(added, strings(&["c"]));
        assert_eq!(read_tags(&path).unwrap(), strings(&["a", "b", "c"]));

        let added = add_tags(&path, &strings(&["a"])).unwrap();
        assert!(added.is_empty());
    }

    #[test]
    fn test_add_tags_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.txt");
        add_tags(&path, &strings(&["x"])).unwrap();
        assert_eq!(read_tags(&path).unwrap(), strings(&["x"]));
    }

    #[test]
    fn test_remove_and_insert_restore_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        write_tags(&path, &strings(&["a", "b", "c"])).unwrap();

        let index = remove_tag(&path, "b").unwrap();
        assert_eq!(index, Some(1));
        assert_eq!(read_tags(&path).unwrap(), strings(&["a", "c"]));
        assert_eq!(remove_tag(&path, "zzz").unwrap(), None);

        insert_tag(&path, "b", 1).unwrap();
        assert_eq!(read_tags(&path).unwrap(), strings(&["a", "b", "c"]));

        insert_tag(&path, "d", 99).unwrap();
        assert_eq!(read_tags(&path).unwrap(), strings(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_merge_positions() {
        let existing = strings(&["b", "c"]);
        let new_tags = strings(&["a", "c", "d"]);
        assert_eq!(merge(&existing, &new_tags, Position::Prepend), strings(&["a", "d", "b", "c"]));
        assert_eq!(merge(&existing, &new_tags, Position::Append), strings(&["b", "c", "a", "d"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "cat").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_tags(&path, &strings(&["cat", "dog"])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "cat, dog");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);
    }
}
