//! Discovery of images and tag files inside a folder tree.

use anyhow::{ensure, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported image extensions.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Extension of sidecar tag files.
pub const TAG_EXTENSION: &str = "txt";

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            extensions.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Check if the path is an image file.
pub fn is_image(path: &Path) -> bool {
    has_extension(path, &IMAGE_EXTENSIONS)
}

fn walk_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    ensure!(dir.is_dir(), "{} is not a directory", dir.display());

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, extensions))
        .collect();

    files.sort();
    Ok(files)
}

/// All images below `dir`, sorted by path.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>> {
    walk_files(dir, &IMAGE_EXTENSIONS)
}

/// All `.txt` files below `dir`, sorted by path.
pub fn find_tag_files(dir: &Path) -> Result<Vec<PathBuf>> {
    walk_files(dir, &[TAG_EXTENSION])
}

/// Moves `selected` to the front when it is part of `paths`.
pub fn prioritize(mut paths: Vec<PathBuf>, selected: Option<&Path>) -> Vec<PathBuf> {
    if let Some(selected) = selected {
        if let Some(pos) = paths.iter().position(|p| p == selected) {
            let item = paths.remove(pos);
            paths.insert(0, item);
        }
    }
    paths
}

/// Directories below `start_path` that directly contain images, sorted.
pub fn suggest_image_directories(start_path: &Path) -> Result<Vec<PathBuf>> {
    let mut image_dirs: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(start_path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() && is_image(entry.path()) {
            if let Some(parent) = entry.path().parent() {
                if !image_dirs.iter().any(|d| d == parent) {
                    image_dirs.push(parent.to_path_buf());
                }
            }
        }
    }

    image_dirs.sort();
    Ok(image_dirs)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/b.PNG")));
        assert!(is_image(Path::new("photo.jpeg")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("no_extension")));
    }

    #[test]
    fn test_find_images_recursive_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.png", "a.JPG", "sub/c.webp", "a.txt", "readme.md"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let images = find_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "sub/c.webp"]);

        let txts = find_tag_files(dir.path()).unwrap();
        assert_eq!(txts, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn test_find_images_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(find_images(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_prioritize() {
        let paths = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let moved = prioritize(paths.clone(), Some(Path::new("c")));
        assert_eq!(moved, vec![PathBuf::from("c"), PathBuf::from("a"), PathBuf::from("b")]);
        let unchanged = prioritize(paths.clone(), Some(Path::new("z")));
        assert_eq!(unchanged, paths);
    }

    #[test]
    fn test_suggest_image_directories_sorted() {
        let dir = tempdir().unwrap();
        for name in ["z/deep/a.png", "z/b.png", "m/c.jpg", "m/d.png", "notes/e.txt"] {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }

        let dirs = suggest_image_directories(dir.path()).unwrap();
        assert_eq!(
            dirs,
            vec![
                dir.path().join("m"),
                dir.path().join("z"),
                dir.path().join("z/deep"),
            ]
        );
    }
}
