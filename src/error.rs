//! # Error Handling
//!
//! Most of the library returns `anyhow::Result` and attaches context as errors
//! bubble up. The `TaggerError` enum covers the failures a caller is expected to
//! tell apart (a bad setting, a corrupted download, a model without a usable
//! output). These are raised through `anyhow` and can be recovered with
//! `downcast_ref::<TaggerError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("invalid value {value:?} for [{section}] {key}: {reason}")]
    Config {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown setting [{section}] {key}")]
    UnknownSetting { section: String, key: String },

    #[error("model has no `prediction` or `logits` output (found: {0:?})")]
    MissingOutput(Vec<String>),

    #[error("no tag CSV found in {}", .0.display())]
    LabelsNotFound(PathBuf),

    #[error("SHA-256 mismatch for {}: expected {expected}, got {actual}", .path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("size mismatch for {}: expected {expected} bytes, got {actual}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error(
        "local file {} is larger than the remote file ({local} > {remote} bytes)",
        .path.display()
    )]
    LocalFileTooLarge { path: PathBuf, local: u64, remote: u64 },

    #[error("malformed LFS pointer: {0}")]
    Pointer(String),

    #[error("download of {} was stopped", .0.display())]
    Stopped(PathBuf),

    #[error("no tags given")]
    EmptyTagInput,
}

impl TaggerError {
    pub(crate) fn config(section: &str, key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
