//! # Pixtag
//!
//! Terminal front end for the `pixtag` library.
//!
//! Without a subcommand a TUI opens for browsing a folder, editing tags and
//! running the tagger. The subcommands expose the same operations for scripts.

mod app;
mod args;
mod ascii;
mod cli;
mod core;
mod tui;
mod ui;

use anyhow::Result;
use app::App;
use args::Args;
use clap::Parser;
use pixtag::{
    config::Settings,
    logging::{self, LogOptions},
};
use std::path::Path;
use tracing::debug;

/// The main entry point for the `pixtag` application.
///
/// Loads `config.ini`, sets up logging and launches either the CLI or the TUI.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    let debug_log = settings.debug_log_path();
    let level = if args.verbose || settings.debug.debug_log {
        "debug"
    } else {
        "info"
    };
    logging::init(LogOptions {
        level,
        stderr: args.command.is_some(),
        file: settings.debug.debug_log.then_some(debug_log.as_path()),
    })?;
    debug!(config = ?args.config, "settings loaded");

    match args.command {
        Some(command) => cli::run(command, &args.config, settings).await,
        None => run_tui(&args.config, settings).await,
    }
}

/// Runs the application in TUI mode.
async fn run_tui(config_path: &Path, settings: Settings) -> Result<()> {
    let mut terminal = tui::setup_terminal()?;

    let mut app = App::new(settings, config_path.to_path_buf());
    let result = app.run(&mut terminal).await;

    tui::restore_terminal(&mut terminal)?;
    result?;

    app.save_settings()
}
