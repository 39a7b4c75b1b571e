use pixtag::{
    bulk::{bulk_add, bulk_remove, tag_statistics},
    job::StopFlag,
    sidecar::Position,
};
use std::{fs, path::Path};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

#[test]
fn test_bulk_append_and_prepend() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "cat, dog");
    write(dir.path(), "sub/b.txt", "cat, solo");
    let stop = StopFlag::new();

    let outcome = bulk_add(dir.path(), "solo, outdoors", Position::Append, &stop).unwrap();
    assert_eq!(outcome.modified(), 2);
    assert_eq!(read(dir.path(), "a.txt"), "cat, dog, outdoors, solo");
    assert_eq!(read(dir.path(), "sub/b.txt"), "cat, solo, outdoors");

    // Each file remembers only what was added to it.
    let added: Vec<&Vec<String>> = outcome.changed.iter().map(|(_, t)| t).collect();
    assert_eq!(added[0], &vec!["outdoors".to_string(), "solo".to_string()]);
    assert_eq!(added[1], &vec!["outdoors".to_string()]);

    let outcome = bulk_add(dir.path(), "best", Position::Prepend, &stop).unwrap();
    assert_eq!(outcome.modified(), 2);
    assert_eq!(read(dir.path(), "a.txt"), "best, cat, dog, outdoors, solo");
}

#[test]
fn test_bulk_add_skips_files_that_have_everything() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "cat, dog");
    write(dir.path(), "b.txt", "dog");

    let outcome = bulk_add(dir.path(), "dog", Position::Append, &StopFlag::new()).unwrap();
    assert_eq!(outcome.modified(), 0);
    assert_eq!(read(dir.path(), "a.txt"), "cat, dog");
}

#[test]
fn test_bulk_remove_every_occurrence() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "cat, dog, cat");
    write(dir.path(), "b.txt", "dog, cat");
    write(dir.path(), "c.txt", "bird");

    let outcome = bulk_remove(dir.path(), " cat ", &StopFlag::new()).unwrap();
    assert_eq!(outcome.modified(), 2);
    assert_eq!(read(dir.path(), "a.txt"), "dog");
    assert_eq!(read(dir.path(), "b.txt"), "dog");
    assert_eq!(read(dir.path(), "c.txt"), "bird");

    let indices: Vec<usize> = outcome.changed.iter().map(|(_, i)| *i).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn test_stopped_bulk_edit_changes_nothing() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "cat");
    let stop = StopFlag::new();
    stop.stop();

    let outcome = bulk_add(dir.path(), "dog", Position::Append, &stop).unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.modified(), 0);
    assert_eq!(read(dir.path(), "a.txt"), "cat");
}

#[test]
fn test_statistics_sorted_by_count() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", "cat, dog");
    write(dir.path(), "b.txt", "dog, bird");
    write(dir.path(), "c.txt", "dog, cat");
    write(dir.path(), "d.txt", "");

    let stats = tag_statistics(dir.path(), &StopFlag::new()).unwrap();
    assert_eq!(stats.files, 4);
    assert_eq!(
        stats.counts,
        vec![
            ("dog".to_string(), 3),
            ("cat".to_string(), 2),
            ("bird".to_string(), 1)
        ]
    );
}

#[test]
fn test_missing_folder_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(tag_statistics(&missing, &StopFlag::new()).is_err());
    assert!(bulk_remove(&missing, "cat", &StopFlag::new()).is_err());
}
