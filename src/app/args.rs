use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the settings file
    #[arg(short, long, global = true, default_value = "config.ini")]
    pub config: PathBuf,

    /// Log debug messages
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Tag every image in a folder
    Tag {
        /// Folder to tag (defaults to the configured input folder)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Image to process first
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Replace existing tag files without asking
        #[arg(long, conflicts_with = "skip_existing")]
        overwrite: bool,

        /// Keep existing tag files without asking
        #[arg(long)]
        skip_existing: bool,

        /// Execution device for this run, e.g. `cpu`, `cuda:0` or `coreml`
        #[arg(long)]
        device: Option<String>,
    },

    /// Download and verify the tagger model
    Download,

    /// Show model and folder status
    Status,

    /// Show or edit the tags of one image
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    /// Add or remove tags in every tag file of a folder
    Bulk {
        #[command(subcommand)]
        command: BulkCommand,

        /// Folder to edit (defaults to the configured input folder)
        #[arg(short, long, global = true)]
        dir: Option<PathBuf>,
    },

    /// Count tags over every tag file of a folder
    Stats {
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Number of tags to show
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Undo the last tag edit
    Undo {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Redo the last undone tag edit
    Redo {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// List the undo and redo history
    History {
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum TagsCommand {
    /// Print the tags of an image
    Show { image: PathBuf },
    /// Add comma-separated tags to an image
    Add { image: PathBuf, tags: String },
    /// Remove one tag from an image
    Remove { image: PathBuf, tag: String },
}

#[derive(Subcommand, Debug)]
pub enum BulkCommand {
    /// Add comma-separated tags to every tag file
    Add {
        tags: String,

        /// Put the new tags in front instead of at the end
        #[arg(long)]
        prepend: bool,
    },
    /// Remove a tag from every tag file
    Remove { tag: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current settings
    Show,
    /// Change one setting, e.g. `config set Thresholds general 0.5`
    Set {
        section: String,
        key: String,
        value: String,
    },
}
