//! Model files and their download.
//!
//! The tagger needs `model.onnx` and `selected_tags.csv` from the
//! `deepghs/pixai-tagger-v0.9-onnx` repository. The model is stored with Git
//! LFS, so its expected size and SHA-256 come from the LFS pointer file.
//! Interrupted downloads resume with an HTTP range request.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::{header::RANGE, Client, StatusCode};
use sha2::{Digest, Sha256};

use crate::{
    config::{update_model_verification, Settings},
    error::TaggerError,
    job::StopFlag,
};

pub const MODEL_REPO: &str = "deepghs/pixai-tagger-v0.9-onnx";
pub const TAGS_CSV_NAME: &str = "selected_tags.csv";
const HF_BASE: &str = "https://huggingface.co";

/// URL serving the actual content of `file_name`.
pub fn resolve_url(file_name: &str) -> String {
    format!("{}/{}/resolve/main/{}", HF_BASE, MODEL_REPO, file_name)
}

/// URL serving the file as stored in git, i.e. the LFS pointer for large files.
pub fn raw_url(file_name: &str) -> String {
    format!("{}/{}/raw/main/{}", HF_BASE, MODEL_REPO, file_name)
}

/// Size and digest announced by a Git LFS pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfsPointer {
    pub sha256: String,
    pub size: u64,
}

pub fn parse_lfs_pointer(text: &str) -> Result<LfsPointer, TaggerError> {
    let mut sha256 = None;
    let mut size = None;

    for line in text.lines().map(str::trim) {
        if let Some(oid) = line.strip_prefix("oid sha256:") {
            sha256 = Some(oid.trim().to_lowercase());
        } else if let Some(value) = line.strip_prefix("size ") {
            let parsed = value
                .trim()
                .parse::<u64>()
                .map_err(|e| TaggerError::Pointer(format!("bad size {:?}: {}", value, e)))?;
            size = Some(parsed);
        }
    }

    let size = size.ok_or_else(|| TaggerError::Pointer("missing `size` line".to_string()))?;
    match sha256 {
        Some(sha256) if !sha256.is_empty() => Ok(LfsPointer { sha256, size }),
        _ => Err(TaggerError::Pointer("missing `oid sha256:` line".to_string())),
    }
}

/// Hex SHA-256 of a file, read in chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1 << 20];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn sha256_file_async(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&path)).await?
}

/// Local locations of the model files.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tags_csv: PathBuf,
}

impl ModelFiles {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.model_path(),
            tags_csv: settings.model_dir().join(TAGS_CSV_NAME),
        }
    }

    pub fn exist(&self) -> bool {
        self.model.is_file() && self.tags_csv.is_file()
    }

    /// The model was verified and both files are on disk.
    pub fn is_available(settings: &Settings) -> bool {
        settings.model.verified && Self::from_settings(settings).exist()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub file_name: String,
    pub percent: u8,
    pub downloaded_mb: f64,
    pub total_mb: f64,
}

impl DownloadProgress {
    fn new(file_name: &str, downloaded: u64, total: u64) -> Self {
        let percent = if total > 0 {
            (downloaded.saturating_mul(100) / total).min(100) as u8
        } else {
            0
        };
        Self {
            file_name: file_name.to_string(),
            percent,
            downloaded_mb: downloaded as f64 / 1024.0 / 1024.0,
            total_mb: total as f64 / 1024.0 / 1024.0,
        }
    }
}

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Already complete on disk.
    Present,
    Downloaded,
}

/// What a file is expected to look like once downloaded.
#[derive(Debug, Clone, Default)]
pub struct Expected<'a> {
    pub size: Option<u64>,
    pub sha256: Option<&'a str>,
    /// An existing file is trusted without any check.
    pub keep_existing: bool,
}

fn check_hash(path: &Path, actual: &str, expected: &str) -> Result<(), TaggerError> {
    if actual.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to delete {:?}: {}", path, e);
    }
    Err(TaggerError::HashMismatch {
        path: path.to_path_buf(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

pub struct Downloader {
    client: Client,
    stop: StopFlag,
}

impl Downloader {
    pub fn new(stop: StopFlag) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, stop })
    }

    pub async fn fetch_pointer(&self, url: &str) -> Result<LfsPointer> {
        let text = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch model pointer from {}", url))?
            .text()
            .await?;
        Ok(parse_lfs_pointer(&text)?)
    }

    /// Downloads `url` into `dest`, resuming a partial file when possible.
    pub async fn download_file<F>(
        &self,
        url: &str,
        dest: &Path,
        expected: Expected<'_>,
        on_progress: &F,
    ) -> Result<FileStatus>
    where
        F: Fn(DownloadProgress) + Sync,
    {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if dest.is_file() {
            if expected.keep_existing {
                tracing::info!("{} already exists, skipping", file_name);
                return Ok(FileStatus::Present);
            }
            let local = fs::metadata(dest)?.len();
            if let Some(remote) = expected.size {
                if local > remote {
                    return Err(TaggerError::LocalFileTooLarge {
                        path: dest.to_path_buf(),
                        local,
                        remote,
                    }
                    .into());
                }
                if local == remote {
                    if let Some(sha) = expected.sha256 {
                        tracing::info!("Verifying {}", file_name);
                        let actual = sha256_file_async(dest).await?;
                        check_hash(dest, &actual, sha)?;
                    }
                    tracing::info!("{} is complete", file_name);
                    on_progress(DownloadProgress::new(&file_name, remote, remote));
                    return Ok(FileStatus::Present);
                }
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut downloaded = if dest.is_file() { fs::metadata(dest)?.len() } else { 0 };
        // Size from the LFS pointer when known, else from the response.
        let mut total = expected.size.unwrap_or(0);

        tracing::info!("Connecting to {}", url);
        let response = self
            .client
            .get(url)
            .header(RANGE, format!("bytes={}-", downloaded))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to download {}", url))?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            if downloaded > 0 {
                tracing::warn!("Server ignored the range request, restarting {}", file_name);
            }
            downloaded = 0;
        }
        let append = downloaded > 0;

        if let Some(content_length) = response.content_length().filter(|&l| l > 0) {
            let announced = downloaded + content_length;
            if append {
                tracing::info!(
                    "Resuming {} at {:.2} MB of {:.2} MB",
                    file_name,
                    downloaded as f64 / 1024.0 / 1024.0,
                    announced as f64 / 1024.0 / 1024.0
                );
            }
            match expected.size {
                Some(size) if size != announced => tracing::warn!(
                    "Server announced {} bytes for {}, expected {}",
                    announced,
                    file_name,
                    size
                ),
                Some(_) => {}
                None => total = announced,
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(dest)
            .with_context(|| format!("Failed to open {:?} for writing", dest))?;

        on_progress(DownloadProgress::new(&file_name, downloaded, total));

        let mut stream = response.bytes_stream();
        let mut last_percent = None;
        while let Some(chunk) = stream.next().await {
            if self.stop.is_stopped() {
                break;
            }
            let chunk = chunk.with_context(|| format!("Connection lost while downloading {}", file_name))?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;

            let progress = DownloadProgress::new(&file_name, downloaded, total);
            if last_percent != Some(progress.percent) {
                last_percent = Some(progress.percent);
                on_progress(progress);
            }
        }
        file.flush()?;
        drop(file);

        if self.stop.is_stopped() {
            tracing::warn!("Download of {} stopped by user", file_name);
            return Err(TaggerError::Stopped(dest.to_path_buf()).into());
        }

        let final_size = fs::metadata(dest)?.len();
        if total > 0 && final_size != total {
            return Err(TaggerError::SizeMismatch {
                path: dest.to_path_buf(),
                expected: total,
                actual: final_size,
            }
            .into());
        }

        if let Some(sha) = expected.sha256 {
            tracing::info!("Verifying {}", file_name);
            let actual = sha256_file_async(dest).await?;
            check_hash(dest, &actual, sha)?;
        }

        on_progress(DownloadProgress::new(&file_name, final_size, final_size.max(total)));
        tracing::info!("Downloaded {}", file_name);
        Ok(FileStatus::Downloaded)
    }

    /// Fetches the model and its tag list, then marks the model verified.
    pub async fn download_model<F>(
        &self,
        settings: &Settings,
        config_path: &Path,
        on_progress: &F,
    ) -> Result<()>
    where
        F: Fn(DownloadProgress) + Sync,
    {
        let files = ModelFiles::from_settings(settings);
        let model_name = settings.paths.model_filename.as_str();

        let pointer = self.fetch_pointer(&raw_url(model_name)).await?;
        tracing::info!(
            "Model size {:.2} MB, sha256 {}",
            pointer.size as f64 / 1024.0 / 1024.0,
            pointer.sha256
        );

        self.download_file(
            &resolve_url(model_name),
            &files.model,
            Expected {
                size: Some(pointer.size),
                sha256: Some(&pointer.sha256),
                keep_existing: false,
            },
            on_progress,
        )
        .await?;
        update_model_verification(config_path, true)?;

        if self.stop.is_stopped() {
            return Err(TaggerError::Stopped(files.tags_csv).into());
        }

        self.download_file(
            &resolve_url(TAGS_CSV_NAME),
            &files.tags_csv,
            Expected {
                keep_existing: true,
                ..Expected::default()
            },
            on_progress,
        )
        .await?;

        tracing::info!("Model files are ready in {:?}", settings.model_dir());
        Ok(())
    }
}
