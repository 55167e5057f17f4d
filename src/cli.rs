use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue chapters for translation
    Enqueue {
        /// Parent (book or series) id
        #[arg(short, long)]
        parent: i64,

        /// Chapter ids to translate; all chapters of the parent when omitted
        #[arg(short, long, value_delimiter = ',')]
        chapters: Vec<i64>,

        /// Source language code, or "auto"
        #[arg(short, long, default_value = "auto")]
        source_lang: String,

        /// Target language code
        #[arg(short, long)]
        target_lang: String,

        /// Priority tier: low, normal, high, user
        #[arg(long, default_value = "normal")]
        priority: String,
    },

    /// Restore the saved queue and translate until it is empty
    Run,

    /// Inspect or edit the pending queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Manage translated chapters
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List or select translation engines
    Engines {
        #[command(subcommand)]
        action: EngineAction,
    },

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// List pending chapters in execution order
    List,

    /// Remove every pending chapter
    Clear,

    /// Remove one pending chapter
    Remove {
        /// Chapter id
        chapter: i64,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show cache statistics and size
    Info,

    /// List cached translations
    List,

    /// Clear all cached translations
    Clear,

    /// Delete one chapter translation
    Delete {
        #[arg(short, long)]
        parent: i64,

        #[arg(short, long)]
        chapter: i64,

        #[arg(short, long)]
        target_lang: String,
    },

    /// Delete every translation of a parent
    DeleteParent {
        parent: i64,
    },

    /// Print a translated chapter
    Show {
        #[arg(short, long)]
        chapter: i64,

        #[arg(short, long)]
        target_lang: String,
    },
}

#[derive(Subcommand)]
pub enum EngineAction {
    /// List engines and their status
    List,

    /// Select the engine used for new translations
    Select {
        /// Engine id
        id: String,
    },
}
