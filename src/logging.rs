//! Tracing setup shared by the CLI and the TUI.

use std::{
    fs::OpenOptions,
    path::Path,
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions<'a> {
    /// Default level when `RUST_LOG` is not set.
    pub level: &'a str,
    /// Print to stderr. The TUI turns this off because it owns the terminal.
    pub stderr: bool,
    /// Append to this file as well, without colors.
    pub file: Option<&'a Path>,
}

pub fn init(options: LogOptions<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.level))
        .with_context(|| format!("Invalid log level {:?}", options.level))?;

    let stderr_layer = options
        .stderr
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let file_layer = match options.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
