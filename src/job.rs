//! Folder tagging runs.
//!
//! A `TaggingJob` walks an ordered list of images, asks an `OverwritePolicy`
//! before replacing an existing sidecar file, tags each image and writes the
//! result. Problems with single images are reported and the run moves on.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    config::{update_model_verification, Settings},
    media,
    pipeline::{ImageTagger, TaggingPipeline},
    sidecar,
};

/// Shared stop request for long running work.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Answer to "the tag file already exists, overwrite it?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteDecision {
    Overwrite,
    Skip,
    /// Overwrite this and every later file without asking.
    OverwriteAll,
    /// Skip this and every later existing file without asking.
    SkipAll,
}

impl OverwriteDecision {
    fn overwrites(self) -> bool {
        matches!(self, OverwriteDecision::Overwrite | OverwriteDecision::OverwriteAll)
    }

    fn is_sticky(self) -> bool {
        matches!(self, OverwriteDecision::OverwriteAll | OverwriteDecision::SkipAll)
    }
}

/// Decides whether an existing sidecar file may be replaced.
pub trait OverwritePolicy {
    fn decide(&mut self, image: &Path, sidecar: &Path) -> OverwriteDecision;
}

impl<F> OverwritePolicy for F
where
    F: FnMut(&Path, &Path) -> OverwriteDecision,
{
    fn decide(&mut self, image: &Path, sidecar: &Path) -> OverwriteDecision {
        self(image, sidecar)
    }
}

/// Same answer for every file.
#[derive(Debug, Clone, Copy)]
pub struct Always(pub OverwriteDecision);

impl OverwritePolicy for Always {
    fn decide(&mut self, _image: &Path, _sidecar: &Path) -> OverwriteDecision {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stopped: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { total: usize },
    /// `index` is zero-based.
    Processing { index: usize, total: usize, path: PathBuf },
    Written { path: PathBuf, tags: Vec<String> },
    Skipped { path: PathBuf },
    Failed { path: PathBuf, reason: String },
    Finished(JobSummary),
}

/// A tagging run over a fixed, ordered list of images.
#[derive(Debug, Clone)]
pub struct TaggingJob {
    images: Vec<PathBuf>,
}

impl TaggingJob {
    pub fn new(images: Vec<PathBuf>) -> Self {
        Self { images }
    }

    /// Every image below `dir`, with `selected` moved to the front.
    pub fn for_folder(dir: &Path, selected: Option<&Path>) -> Result<Self> {
        let images = media::find_images(dir)?;
        Ok(Self::new(media::prioritize(images, selected)))
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn run<T, P, F>(
        &self,
        tagger: &mut T,
        policy: &mut P,
        stop: &StopFlag,
        mut on_event: F,
    ) -> JobSummary
    where
        T: ImageTagger + ?Sized,
        P: OverwritePolicy + ?Sized,
        F: FnMut(JobEvent),
    {
        let started = Instant::now();
        let total = self.images.len();
        let mut summary = JobSummary::default();
        let mut sticky: Option<OverwriteDecision> = None;

        tracing::info!("Tagging {} images", total);
        on_event(JobEvent::Started { total });

        for (index, image_path) in self.images.iter().enumerate() {
            if stop.is_stopped() {
                tracing::warn!("Tagging stopped by user after {} of {} images", index, total);
                summary.stopped = true;
                break;
            }

            let position = format!("[{}/{}]", index + 1, total);
            let sidecar_path = sidecar::sidecar_path(image_path);

            if sidecar_path.is_file() {
                let decision = match sticky {
                    Some(decision) => decision,
                    None => {
                        let decision = policy.decide(image_path, &sidecar_path);
                        if decision.is_sticky() {
                            sticky = Some(decision);
                        }
                        decision
                    }
                };
                if !decision.overwrites() {
                    tracing::info!("{} Skipped existing {:?}", position, sidecar_path);
                    summary.skipped += 1;
                    on_event(JobEvent::Skipped {
                        path: image_path.clone(),
                    });
                    continue;
                }
            }

            on_event(JobEvent::Processing {
                index,
                total,
                path: image_path.clone(),
            });
            tracing::info!("{} Processing {:?}", position, image_path);

            match tag_one(tagger, image_path, &sidecar_path) {
                Ok(tags) => {
                    tracing::debug!("{} Wrote {:?}: {}", position, sidecar_path, tags.join(", "));
                    summary.written += 1;
                    on_event(JobEvent::Written {
                        path: image_path.clone(),
                        tags,
                    });
                }
                Err(e) => {
                    tracing::error!("{} {:?}: {:#}", position, image_path, e);
                    summary.failed += 1;
                    on_event(JobEvent::Failed {
                        path: image_path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            "Tagging finished: {} written, {} skipped, {} failed{}",
            summary.written,
            summary.skipped,
            summary.failed,
            if summary.stopped { " (stopped)" } else { "" }
        );
        on_event(JobEvent::Finished(summary.clone()));
        summary
    }
}

fn tag_one<T: ImageTagger + ?Sized>(
    tagger: &mut T,
    image_path: &Path,
    sidecar_path: &Path,
) -> Result<Vec<String>> {
    let image = image::open(image_path).context("Failed to load image")?;
    let tags = tagger.tag_image(&image).context("Inference failed")?;
    anyhow::ensure!(!tags.is_empty(), "No tags above the thresholds");
    sidecar::write_tags(sidecar_path, &tags)?;
    Ok(tags)
}

/// Builds the pipeline for a run.
///
/// A model that fails to load is marked unverified in `config.ini` so the
/// next start offers the download again.
pub fn load_pipeline(settings: &Settings, config_path: &Path) -> Result<TaggingPipeline> {
    match TaggingPipeline::load(settings) {
        Ok(pipeline) => Ok(pipeline),
        Err(e) => {
            tracing::error!("Failed to initialize the tagger: {:#}", e);
            if let Err(save_err) = update_model_verification(config_path, false) {
                tracing::warn!("Could not mark the model as unverified: {:#}", save_err);
            }
            Err(e)
        }
    }
}
