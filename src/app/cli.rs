//! Handlers for the non-interactive subcommands.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    sync::mpsc,
};

use pixtag::{
    bulk,
    config::Settings,
    file::ModelFiles,
    history::{history_path, UndoAction, UndoManager},
    job::{Always, JobEvent, OverwriteDecision, StopFlag},
    media, sidecar,
    sidecar::Position,
    tag::parse_tag_input,
};

use crate::{
    args::{BulkCommand, Commands, ConfigCommand, TagsCommand},
    core::{self, describe_event, ProgressUpdate},
};

pub async fn run(command: Commands, config_path: &Path, mut settings: Settings) -> Result<()> {
    match command {
        Commands::Tag {
            dir,
            image,
            overwrite,
            skip_existing,
            device,
        } => {
            if let Some(device) = device {
                settings.set("Model", "device", &device)?;
            }
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            run_tagging(settings, config_path, dir, image, overwrite, skip_existing).await
        }
        Commands::Download => run_download(settings, config_path).await,
        Commands::Status => show_status(&settings),
        Commands::Tags { command } => {
            let dir = settings.input_dir();
            run_tags(command, &dir)
        }
        Commands::Bulk { command, dir } => {
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            run_bulk(command, &dir).await
        }
        Commands::Stats { dir, limit } => {
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            show_stats(&dir, limit)
        }
        Commands::Undo { dir } => {
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            step_history(&dir, true)
        }
        Commands::Redo { dir } => {
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            step_history(&dir, false)
        }
        Commands::History { dir } => {
            let dir = dir.unwrap_or_else(|| settings.input_dir());
            show_history(&dir)
        }
        Commands::Config { command } => match command {
            ConfigCommand::Show => {
                print!("{}", settings.render()?);
                Ok(())
            }
            ConfigCommand::Set {
                section,
                key,
                value,
            } => {
                settings.set(&section, &key, &value)?;
                settings.save(config_path)?;
                println!("[{}] {} = {}", section, key, value);
                Ok(())
            }
        },
    }
}

/// Asks about one existing sidecar file. `answers` is shared by every prompt
/// of a run, so piped answers are consumed one line at a time.
async fn prompt_overwrite<R>(sidecar: &Path, answers: &mut Lines<R>) -> Result<OverwriteDecision>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        print!(
            "{} already exists. [o]verwrite, [s]kip, overwrite [a]ll, skip all [n]? ",
            sidecar.display()
        );
        std::io::stdout().flush()?;
        let Some(line) = answers.next_line().await? else {
            return Ok(OverwriteDecision::SkipAll);
        };
        match line.trim().to_lowercase().as_str() {
            "o" | "overwrite" | "y" | "yes" => return Ok(OverwriteDecision::Overwrite),
            "s" | "skip" | "" => return Ok(OverwriteDecision::Skip),
            "a" | "all" => return Ok(OverwriteDecision::OverwriteAll),
            "n" | "none" => return Ok(OverwriteDecision::SkipAll),
            _ => println!("Please answer o, s, a or n."),
        }
    }
}

/// Runs the application in CLI mode.
async fn run_tagging(
    settings: Settings,
    config_path: &Path,
    dir: PathBuf,
    image: Option<PathBuf>,
    overwrite: bool,
    skip_existing: bool,
) -> Result<()> {
    if !ModelFiles::is_available(&settings) {
        bail!("The model is not available. Run `pixtag download` first.");
    }

    let (tx, mut rx) = mpsc::channel(100);
    let stop = StopFlag::new();

    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_stop.stop();
        }
    });

    let config_path = config_path.to_path_buf();
    if overwrite || skip_existing {
        let answer = if overwrite {
            OverwriteDecision::OverwriteAll
        } else {
            OverwriteDecision::SkipAll
        };
        core::spawn_tagging(settings, config_path, dir, image, Always(answer), stop, tx);
    } else {
        let policy = core::ChannelPolicy::new(tx.clone());
        core::spawn_tagging(settings, config_path, dir, image, policy, stop, tx);
    }

    let mut answers = BufReader::new(tokio::io::stdin()).lines();
    let mut failed = false;
    while let Some(update) = rx.recv().await {
        match update {
            ProgressUpdate::Message(msg) => println!("{}", msg),
            ProgressUpdate::Job(event) => {
                let line = describe_event(&event);
                match &event {
                    JobEvent::Failed { .. } => eprintln!("{}", line),
                    JobEvent::Finished(summary) => {
                        println!("{}", line);
                        failed = summary.failed > 0;
                    }
                    _ => println!("{}", line),
                }
            }
            ProgressUpdate::Overwrite { sidecar, reply } => {
                let decision = prompt_overwrite(&sidecar, &mut answers).await?;
                let _ = reply.send(decision);
            }
            ProgressUpdate::Error(e) => bail!(e),
            _ => {}
        }
    }

    if failed {
        bail!("Some images could not be tagged");
    }
    Ok(())
}

async fn run_download(settings: Settings, config_path: &Path) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(100);
    let stop = StopFlag::new();

    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_stop.stop();
        }
    });

    core::spawn_download(settings, config_path.to_path_buf(), stop, tx);

    while let Some(update) = rx.recv().await {
        match update {
            ProgressUpdate::Download(p) => {
                print!(
                    "\r{}: {:>3}% ({:.2} / {:.2} MB)",
                    p.file_name, p.percent, p.downloaded_mb, p.total_mb
                );
                std::io::stdout().flush()?;
                if p.percent == 100 {
                    println!();
                }
            }
            ProgressUpdate::DownloadFinished(result) => {
                return match result {
                    Ok(()) => {
                        println!("Model downloaded and verified.");
                        Ok(())
                    }
                    Err(e) => bail!("Download failed: {}", e),
                };
            }
            _ => {}
        }
    }
    Ok(())
}

fn show_status(settings: &Settings) -> Result<()> {
    let files = ModelFiles::from_settings(settings);
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!("Model file:     {} ({})", files.model.display(), yes_no(files.model.is_file()));
    println!("Tag list:       {} ({})", files.tags_csv.display(), yes_no(files.tags_csv.is_file()));
    println!("Verified:       {}", yes_no(settings.model.verified));
    println!("Available:      {}", yes_no(ModelFiles::is_available(settings)));
    println!("Device:         {}", settings.model.device);

    let input_dir = settings.input_dir();
    match media::find_images(&input_dir) {
        Ok(images) => {
            let tagged = images
                .iter()
                .filter(|p| sidecar::sidecar_path(p).is_file())
                .count();
            println!(
                "Input folder:   {} ({} images, {} tagged)",
                input_dir.display(),
                images.len(),
                tagged
            );
        }
        Err(_) => println!("Input folder:   {} (missing)", input_dir.display()),
    }
    Ok(())
}

fn record(dir: &Path, action: UndoAction) -> Result<()> {
    let path = history_path(dir);
    let mut history = UndoManager::load(&path)?;
    history.push(action);
    history.save(&path)
}

fn run_tags(command: TagsCommand, history_dir: &Path) -> Result<()> {
    match command {
        TagsCommand::Show { image } => {
            let tags = sidecar::read_tags(&sidecar::sidecar_path(&image))?;
            if tags.is_empty() {
                println!("(no tags)");
            }
            for tag in tags {
                println!("{}", tag);
            }
        }
        TagsCommand::Add { image, tags } => {
            let tags = parse_tag_input(&tags);
            if tags.is_empty() {
                bail!("No tags given");
            }
            let file = sidecar::sidecar_path(&image);
            let added = sidecar::add_tags(&file, &tags)?;
            if added.is_empty() {
                println!("All tags are already present.");
            } else {
                println!("Added: {}", added.join(", "));
                record(history_dir, UndoAction::AddTags { file, tags: added })?;
            }
        }
        TagsCommand::Remove { image, tag } => {
            let file = sidecar::sidecar_path(&image);
            let tag = tag.trim().to_string();
            match sidecar::remove_tag(&file, &tag)? {
                Some(index) => {
                    println!("Removed: {}", tag);
                    record(history_dir, UndoAction::RemoveTag { file, tag, index })?;
                }
                None => println!("{:?} is not a tag of {}", tag, image.display()),
            }
        }
    }
    Ok(())
}

async fn run_bulk(command: BulkCommand, dir: &Path) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(4);
    let stop = StopFlag::new();

    match command {
        BulkCommand::Add { tags, prepend } => {
            let position = if prepend { Position::Prepend } else { Position::Append };
            core::spawn_bulk_add(dir.to_path_buf(), tags, position, stop, tx);
        }
        BulkCommand::Remove { tag } => {
            core::spawn_bulk_remove(dir.to_path_buf(), tag, stop, tx);
        }
    }

    match rx.recv().await {
        Some(ProgressUpdate::BulkFinished { action, message }) => {
            println!("{}", message);
            if let Some(action) = action {
                record(dir, action)?;
            }
            Ok(())
        }
        Some(ProgressUpdate::Error(e)) => bail!(e),
        _ => bail!("Bulk edit ended without a result"),
    }
}

fn show_stats(dir: &Path, limit: usize) -> Result<()> {
    let stats = bulk::tag_statistics(dir, &StopFlag::new())
        .with_context(|| format!("Failed to read tags in {}", dir.display()))?;
    println!("{} tag files, {} distinct tags", stats.files, stats.counts.len());
    for (tag, count) in stats.counts.iter().take(limit) {
        println!("{:>6}  {}", count, tag);
    }
    Ok(())
}

fn step_history(dir: &Path, undo: bool) -> Result<()> {
    let path = history_path(dir);
    let mut history = UndoManager::load(&path)?;
    let result = if undo { history.undo() } else { history.redo() };
    // Failed actions are dropped from the history, so save either way.
    history.save(&path)?;
    match result? {
        Some(description) => println!("{} {}", if undo { "Undid" } else { "Redid" }, description),
        None => println!("Nothing to {}.", if undo { "undo" } else { "redo" }),
    }
    Ok(())
}

fn show_history(dir: &Path) -> Result<()> {
    let history = UndoManager::load(&history_path(dir))?;
    println!("Undo (newest first):");
    for action in history.undo_entries() {
        println!("  {}", action.description());
    }
    println!("Redo (newest first):");
    for action in history.redo_entries() {
        println!("  {}", action.description());
    }
    Ok(())
}
