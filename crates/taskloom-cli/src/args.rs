use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Parser)]
#[command(name = "taskloom")]
#[command(about = "Rebuild, inspect and index the task hierarchy of agent sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Task storage root(s); OS defaults are used when omitted.
    #[arg(long, global = true)]
    pub tasks_root: Vec<PathBuf>,

    #[arg(long, default_value = "plain", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover task directories without reading them
    Scan,

    /// Build or refresh conversation skeletons
    Build {
        /// Rebuild even when source checksums are unchanged
        #[arg(long)]
        force: bool,
    },

    /// Run the two-pass hierarchy reconstruction
    Reconstruct {
        /// Allow similarity / metadata / temporal fallbacks
        #[arg(long)]
        permissive: bool,

        /// Restrict the passes to one workspace
        #[arg(long)]
        workspace: Option<String>,
    },

    /// List cached skeletons
    List,

    /// Show one skeleton in detail
    Show { task_id: String },

    /// Render the reconstructed forest (or one subtree)
    Tree {
        task_id: Option<String>,

        #[arg(long, default_value_t = 10)]
        depth: usize,
    },

    /// Skeleton cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Run the indexing decision service and embedding pipeline
    Index {
        /// Print decisions without calling any external service
        #[arg(long)]
        dry_run: bool,
    },

    /// Cross-machine task archives
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },

    /// Check storage roots, cache health and reconstruction coverage
    Doctor,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Aggregate counters over the cached skeletons
    Stats,
    /// Drop every cached skeleton (raw task logs are untouched)
    Reset,
}

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// Archive one task into a shared directory
    Write {
        task_id: String,
        #[arg(long)]
        dir: PathBuf,
    },
    /// Locate a task's archive across machine subdirectories
    Find {
        task_id: String,
        #[arg(long)]
        dir: PathBuf,
    },
    /// Enumerate archived {machine, task} pairs
    List {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Rebuild a local skeleton from another machine's archive
    Import {
        task_id: String,
        #[arg(long)]
        dir: PathBuf,
    },
}
