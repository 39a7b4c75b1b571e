use anyhow::Result;
use image::DynamicImage;
use pixtag::{
    bulk::{bulk_add, tag_statistics},
    config::{update_model_verification, Settings, CONFIG_FILE_NAME},
    file::ModelFiles,
    history::{history_path, UndoAction, UndoManager},
    job::{Always, OverwriteDecision, StopFlag, TaggingJob},
    media::suggest_image_directories,
    pipeline::ImageTagger,
    sidecar::{read_tags, sidecar_path, Position},
};
use std::fs;
use tempfile::tempdir;

mod common;
use common::image_folder;

struct FixedTagger(Vec<String>);

impl ImageTagger for FixedTagger {
    fn tag_image(&mut self, _image: &DynamicImage) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_config_created_and_updated() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

    let settings = Settings::load(&config_path).unwrap();
    assert!(config_path.is_file());
    assert_eq!(settings.input_dir(), temp_dir.path().join("inputs"));
    assert!(!ModelFiles::is_available(&settings));

    let mut settings = settings;
    settings.set("Thresholds", "general", "0.3").unwrap();
    settings.set("Limits", "character", "2").unwrap();
    assert!(settings.set("Thresholds", "general", "1.5").is_err());
    settings.save(&config_path).unwrap();

    update_model_verification(&config_path, true).unwrap();
    let reloaded = Settings::load(&config_path).unwrap();
    assert_eq!(reloaded.thresholds.general, 0.3);
    assert_eq!(reloaded.limits.character, 2);
    assert!(reloaded.model.verified);

    let text = fs::read_to_string(&config_path).unwrap();
    assert!(text.contains("general=0.30"));
    assert!(text.contains("verified=True"));
}

#[test]
fn test_tag_edit_and_undo_folder() {
    // 1. Setup: a config whose input folder holds a few images.
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
    let settings = Settings::load(&config_path).unwrap();
    let input_dir = settings.input_dir();
    let images = image_folder(&input_dir, &["a.png", "b.png", "more/c.jpg"]);

    let suggested = suggest_image_directories(temp_dir.path()).unwrap();
    assert_eq!(suggested, vec![input_dir.clone(), input_dir.join("more")]);

    // 2. Tag the folder; one image already has tags and keeps them.
    fs::write(sidecar_path(&images[1]), "hand written").unwrap();
    let job = TaggingJob::for_folder(&input_dir, None).unwrap();
    let mut tagger = FixedTagger(vec!["1girl".to_string(), "solo".to_string()]);
    let summary = job.run(
        &mut tagger,
        &mut Always(OverwriteDecision::SkipAll),
        &StopFlag::new(),
        |_| {},
    );
    assert_eq!((summary.written, summary.skipped), (2, 1));

    // 3. Bulk edit, recorded in the folder's history file.
    let outcome = bulk_add(&input_dir, "reviewed", Position::Append, &StopFlag::new()).unwrap();
    assert_eq!(outcome.modified(), 3);
    let path = history_path(&input_dir);
    let mut history = UndoManager::load(&path).unwrap();
    history.push(UndoAction::BulkAdd {
        position: Position::Append,
        files: outcome.changed,
    });
    history.save(&path).unwrap();

    let stats = tag_statistics(&input_dir, &StopFlag::new()).unwrap();
    assert_eq!(stats.counts[0], ("reviewed".to_string(), 3));

    // 4. A later session undoes it.
    let mut history = UndoManager::load(&path).unwrap();
    assert!(history.undo().unwrap().is_some());
    assert_eq!(
        read_tags(&sidecar_path(&images[0])).unwrap(),
        vec!["1girl".to_string(), "solo".to_string()]
    );
    assert_eq!(
        read_tags(&sidecar_path(&images[1])).unwrap(),
        vec!["hand written".to_string()]
    );
}
