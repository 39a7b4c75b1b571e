//! # Pixtag
//!
//! Pixtag tags local images with the PixAI tagger ONNX model and keeps the
//! result in plain-text sidecar files (`image.png` -> `image.txt`). It also
//! provides the editing side: single-image and folder-wide tag edits with
//! undo, and tag statistics for a folder.
//!
//! ## Features
//!
//! - **Tagging**: A `TaggingPipeline` from image to ordered tag list, run over
//!   a folder by `TaggingJob` with overwrite confirmation and a stop flag.
//! - **ONNX Runtime**: Powered by `ort`, on CPU or the execution providers
//!   enabled by cargo features.
//! - **Model download**: Resumable download of the model with size and
//!   SHA-256 verification.
//! - **Editing**: Sidecar file edits, bulk add/remove and undo/redo history.
//!
//! ## Modules
//!
//! - `pipeline`: Score post-processing and the end-to-end pipeline.
//! - `job`: Folder tagging runs.
//! - `tagger`: Handles the ONNX model and session management.
//! - `processor`: Provides tools for image preprocessing.
//! - `tags`: Manages tag labels and their categories.
//! - `tag`: Tag text normalization.
//! - `sidecar`: Reading and writing tag files.
//! - `media`: Finding images and tag files.
//! - `bulk`: Folder-wide edits and statistics.
//! - `history`: Undo / redo.
//! - `file`: Model files and their download.
//! - `config`: Settings stored in `config.ini`.
//! - `error`: Contains the error types for the library.
//! - `logging`: Tracing setup.

pub mod bulk;
pub mod config;
pub mod error;
pub mod file;
pub mod history;
pub mod job;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod processor;
pub mod sidecar;
pub mod tag;
pub mod tagger;
pub mod tags;
