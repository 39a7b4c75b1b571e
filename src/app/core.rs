//! Background work shared by the CLI and the TUI.
//!
//! Each long operation runs off the interactive thread and reports through a
//! `ProgressUpdate` channel. CPU-bound work goes to `spawn_blocking`; the
//! download is an ordinary async task.

use std::path::{Path, PathBuf};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use pixtag::{
    bulk::{self, TagStatistics},
    config::Settings,
    file::{DownloadProgress, Downloader},
    history::UndoAction,
    job::{self, JobEvent, OverwriteDecision, OverwritePolicy, StopFlag, TaggingJob},
    sidecar::Position,
};

/// Represents updates sent from a background task to the front end.
#[derive(Debug)]
pub enum ProgressUpdate {
    Message(String),
    Job(JobEvent),
    /// The tagging run waits for an answer about an existing tag file.
    Overwrite {
        sidecar: PathBuf,
        reply: oneshot::Sender<OverwriteDecision>,
    },
    Download(DownloadProgress),
    DownloadFinished(Result<(), String>),
    /// A bulk edit finished; `action` undoes it.
    BulkFinished {
        action: Option<UndoAction>,
        message: String,
    },
    Stats(TagStatistics),
    Error(String),
}

/// Forwards overwrite questions to the front end and waits for the answer.
///
/// Must be used from a blocking thread.
pub struct ChannelPolicy {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ChannelPolicy {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }
}

impl OverwritePolicy for ChannelPolicy {
    fn decide(&mut self, _image: &Path, sidecar: &Path) -> OverwriteDecision {
        let (reply, answer) = oneshot::channel();
        let request = ProgressUpdate::Overwrite {
            sidecar: sidecar.to_path_buf(),
            reply,
        };
        if self.tx.blocking_send(request).is_err() {
            return OverwriteDecision::SkipAll;
        }
        // A front end that goes away without answering keeps the file.
        answer.blocking_recv().unwrap_or(OverwriteDecision::Skip)
    }
}

/// Tags `dir` with the model from `settings`.
pub fn spawn_tagging<P>(
    settings: Settings,
    config_path: PathBuf,
    dir: PathBuf,
    selected: Option<PathBuf>,
    mut policy: P,
    stop: StopFlag,
    tx: mpsc::Sender<ProgressUpdate>,
) -> JoinHandle<()>
where
    P: OverwritePolicy + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let send = |update: ProgressUpdate| {
            let _ = tx.blocking_send(update);
        };

        let tagging_job = match TaggingJob::for_folder(&dir, selected.as_deref()) {
            Ok(j) => j,
            Err(e) => return send(ProgressUpdate::Error(format!("{:#}", e))),
        };
        if tagging_job.images().is_empty() {
            return send(ProgressUpdate::Error(format!("No images found in {}", dir.display())));
        }

        send(ProgressUpdate::Message("Loading model...".to_string()));
        let mut pipeline = match job::load_pipeline(&settings, &config_path) {
            Ok(p) => p,
            Err(e) => {
                return send(ProgressUpdate::Error(format!(
                    "Failed to initialize the tagger, the model was marked unverified: {:#}",
                    e
                )))
            }
        };

        tagging_job.run(&mut pipeline, &mut policy, &stop, |event| {
            send(ProgressUpdate::Job(event))
        });
    })
}

pub fn spawn_download(
    settings: Settings,
    config_path: PathBuf,
    stop: StopFlag,
    tx: mpsc::Sender<ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let on_progress = move |progress: DownloadProgress| {
            let _ = progress_tx.try_send(ProgressUpdate::Download(progress));
        };

        let result = match Downloader::new(stop) {
            Ok(downloader) => {
                downloader
                    .download_model(&settings, &config_path, &on_progress)
                    .await
            }
            Err(e) => Err(e),
        };
        let _ = tx
            .send(ProgressUpdate::DownloadFinished(result.map_err(|e| format!("{:#}", e))))
            .await;
    })
}

pub fn spawn_bulk_add(
    dir: PathBuf,
    input: String,
    position: Position,
    stop: StopFlag,
    tx: mpsc::Sender<ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let update = match bulk::bulk_add(&dir, &input, position, &stop) {
            Ok(outcome) => {
                let message = format!(
                    "Added \"{}\" to {} files{}",
                    input.trim(),
                    outcome.modified(),
                    failures(outcome.failed, outcome.stopped)
                );
                let action = (!outcome.changed.is_empty()).then(|| UndoAction::BulkAdd {
                    position,
                    files: outcome.changed,
                });
                ProgressUpdate::BulkFinished { action, message }
            }
            Err(e) => ProgressUpdate::Error(format!("Bulk add failed: {:#}", e)),
        };
        let _ = tx.blocking_send(update);
    })
}

pub fn spawn_bulk_remove(
    dir: PathBuf,
    tag: String,
    stop: StopFlag,
    tx: mpsc::Sender<ProgressUpdate>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let update = match bulk::bulk_remove(&dir, &tag, &stop) {
            Ok(outcome) => {
                let message = format!(
                    "Removed \"{}\" from {} files{}",
                    tag,
                    outcome.modified(),
                    failures(outcome.failed, outcome.stopped)
                );
                let action = (!outcome.changed.is_empty()).then(|| UndoAction::BulkRemove {
                    tag: tag.trim().to_string(),
                    files: outcome.changed,
                });
                ProgressUpdate::BulkFinished { action, message }
            }
            Err(e) => ProgressUpdate::Error(format!("Bulk delete failed: {:#}", e)),
        };
        let _ = tx.blocking_send(update);
    })
}

pub fn spawn_stats(dir: PathBuf, stop: StopFlag, tx: mpsc::Sender<ProgressUpdate>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let update = match bulk::tag_statistics(&dir, &stop) {
            Ok(stats) => ProgressUpdate::Stats(stats),
            Err(e) => ProgressUpdate::Error(format!("Failed to load tags: {:#}", e)),
        };
        let _ = tx.blocking_send(update);
    })
}

fn failures(failed: usize, stopped: bool) -> String {
    match (failed, stopped) {
        (0, false) => String::new(),
        (0, true) => " (stopped)".to_string(),
        (n, false) => format!(" ({} failed)", n),
        (n, true) => format!(" ({} failed, stopped)", n),
    }
}

/// Human readable line for a job event, shared by the CLI output and the TUI log.
pub fn describe_event(event: &JobEvent) -> String {
    match event {
        JobEvent::Started { total } => format!("Found {} images", total),
        JobEvent::Processing { index, total, path } => {
            format!("[{}/{}] Processing {}", index + 1, total, path.display())
        }
        JobEvent::Written { path, tags } => {
            format!("Wrote {} tags for {}", tags.len(), file_name(path))
        }
        JobEvent::Skipped { path } => format!("Skipped {} (tag file exists)", file_name(path)),
        JobEvent::Failed { path, reason } => format!("Failed {}: {}", file_name(path), reason),
        JobEvent::Finished(summary) => format!(
            "Finished in {:.1}s: {} written, {} skipped, {} failed{}",
            summary.elapsed.as_secs_f64(),
            summary.written,
            summary.skipped,
            summary.failed,
            if summary.stopped { " (stopped)" } else { "" }
        ),
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
