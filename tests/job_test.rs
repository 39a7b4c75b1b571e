use anyhow::{bail, Result};
use image::DynamicImage;
use pixtag::{
    job::{Always, JobEvent, OverwriteDecision, StopFlag, TaggingJob},
    pipeline::ImageTagger,
    sidecar::{read_tags, sidecar_path},
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::tempdir;

mod common;
use common::image_folder;

/// Tags every image with its width, or nothing for images narrower than `min_width`.
struct FakeTagger {
    calls: usize,
    min_width: u32,
}

impl FakeTagger {
    fn new() -> Self {
        Self {
            calls: 0,
            min_width: 0,
        }
    }
}

impl ImageTagger for FakeTagger {
    fn tag_image(&mut self, image: &DynamicImage) -> Result<Vec<String>> {
        self.calls += 1;
        if image.width() < self.min_width {
            return Ok(Vec::new());
        }
        Ok(vec!["1girl".to_string(), format!("width {}", image.width())])
    }
}

struct FailingTagger;

impl ImageTagger for FailingTagger {
    fn tag_image(&mut self, _image: &DynamicImage) -> Result<Vec<String>> {
        bail!("session exploded")
    }
}

fn run_collect<P: pixtag::job::OverwritePolicy>(
    job: &TaggingJob,
    tagger: &mut dyn ImageTagger,
    policy: &mut P,
    stop: &StopFlag,
) -> (pixtag::job::JobSummary, Vec<JobEvent>) {
    let mut events = Vec::new();
    let summary = job.run(tagger, policy, stop, |e| events.push(e));
    (summary, events)
}

#[test]
fn test_tags_every_image() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png", "b.jpg", "nested/c.webp"]);

    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    assert_eq!(job.images().len(), 3);

    let mut tagger = FakeTagger::new();
    let (summary, events) = run_collect(
        &job,
        &mut tagger,
        &mut Always(OverwriteDecision::Skip),
        &StopFlag::new(),
    );

    assert_eq!(summary.written, 3);
    assert_eq!(summary.failed, 0);
    assert!(!summary.stopped);
    assert_eq!(events.first(), Some(&JobEvent::Started { total: 3 }));
    assert!(matches!(events.last(), Some(JobEvent::Finished(_))));

    for image in &images {
        assert_eq!(
            read_tags(&sidecar_path(image)).unwrap(),
            vec!["1girl".to_string(), "width 32".to_string()]
        );
    }
}

#[test]
fn test_selected_image_goes_first() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png", "b.png", "c.png"]);

    let job = TaggingJob::for_folder(dir.path(), Some(&images[2])).unwrap();
    assert_eq!(job.images()[0], images[2]);
    assert_eq!(&job.images()[1..], &images[..2]);
}

#[test]
fn test_existing_sidecar_asks_before_overwrite() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png", "b.png"]);
    let existing = sidecar_path(&images[0]);
    fs::write(&existing, "keep me").unwrap();

    let mut asked: Vec<PathBuf> = Vec::new();
    let mut policy = |_image: &Path, sidecar: &Path| {
        asked.push(sidecar.to_path_buf());
        OverwriteDecision::Skip
    };

    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let mut tagger = FakeTagger::new();
    let (summary, events) = run_collect(&job, &mut tagger, &mut policy, &StopFlag::new());

    assert_eq!(asked, vec![existing.clone()]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.written, 1);
    assert_eq!(tagger.calls, 1);
    assert!(events.contains(&JobEvent::Skipped {
        path: images[0].clone()
    }));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "keep me");
}

#[test]
fn test_overwrite_replaces_file() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png"]);
    let existing = sidecar_path(&images[0]);
    fs::write(&existing, "old").unwrap();

    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let (summary, _) = run_collect(
        &job,
        &mut FakeTagger::new(),
        &mut Always(OverwriteDecision::Overwrite),
        &StopFlag::new(),
    );

    assert_eq!(summary.written, 1);
    assert_eq!(fs::read_to_string(&existing).unwrap(), "1girl, width 32");
}

#[test]
fn test_all_answers_are_sticky() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png", "b.png", "c.png"]);
    for image in &images {
        fs::write(sidecar_path(image), "old").unwrap();
    }

    let mut questions = 0;
    let mut policy = |_: &Path, _: &Path| {
        questions += 1;
        OverwriteDecision::SkipAll
    };
    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let (summary, _) = run_collect(&job, &mut FakeTagger::new(), &mut policy, &StopFlag::new());
    assert_eq!(questions, 1);
    assert_eq!(summary.skipped, 3);

    let mut questions = 0;
    let mut policy = |_: &Path, _: &Path| {
        questions += 1;
        OverwriteDecision::OverwriteAll
    };
    let (summary, _) = run_collect(&job, &mut FakeTagger::new(), &mut policy, &StopFlag::new());
    assert_eq!(questions, 1);
    assert_eq!(summary.written, 3);
}

#[test]
fn test_stop_before_next_image() {
    let dir = tempdir().unwrap();
    image_folder(dir.path(), &["a.png", "b.png", "c.png"]);

    let stop = StopFlag::new();
    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let mut tagger = FakeTagger::new();
    let summary = job.run(
        &mut tagger,
        &mut Always(OverwriteDecision::Skip),
        &stop,
        |e| {
            if matches!(e, JobEvent::Written { .. }) {
                stop.stop();
            }
        },
    );

    assert!(summary.stopped);
    assert_eq!(summary.written, 1);
    assert_eq!(tagger.calls, 1);
}

#[test]
fn test_failures_are_reported_and_skipped() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png", "b.png"]);
    fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let (summary, events) = run_collect(
        &job,
        &mut FailingTagger,
        &mut Always(OverwriteDecision::Skip),
        &StopFlag::new(),
    );

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.written, 0);
    let reasons: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Failed { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert!(reasons[0].contains("Inference failed"));
    assert!(reasons.iter().any(|r| r.contains("Failed to load image")));
    assert!(images.iter().all(|i| !sidecar_path(i).exists()));
}

#[test]
fn test_empty_result_counts_as_failure() {
    let dir = tempdir().unwrap();
    let images = image_folder(dir.path(), &["a.png"]);

    let job = TaggingJob::for_folder(dir.path(), None).unwrap();
    let mut tagger = FakeTagger {
        calls: 0,
        min_width: 1000,
    };
    let (summary, _) = run_collect(
        &job,
        &mut tagger,
        &mut Always(OverwriteDecision::Skip),
        &StopFlag::new(),
    );

    assert_eq!(summary.failed, 1);
    assert!(!sidecar_path(&images[0]).exists());
}
