//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Batch-ingest merger-tree files into per-seed SQLite databases
#[derive(Parser, Debug)]
#[command(name = "mtreedb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read tree files and store trees above the mass threshold
    Ingest(IngestArgs),

    /// Show which tree files exist per seed
    Scan(SeedArgs),

    /// Summarize a tree database and list its largest trees
    Show {
        /// Per-seed database file
        #[arg(value_hint = ValueHint::FilePath)]
        db: PathBuf,
        /// Number of trees to list
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Print the mass and id history of one tree
    Tree {
        /// Per-seed database file
        #[arg(value_hint = ValueHint::FilePath)]
        db: PathBuf,
        /// Halo id at the latest snapshot
        halo_id: u64,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Where to look and which seeds to visit
#[derive(Args, Debug, Default, Clone)]
pub struct SeedArgs {
    /// Directory holding per-seed tree directories
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,

    /// First seed (inclusive)
    #[arg(long)]
    pub seed_start: Option<u32>,

    /// Last seed (exclusive)
    #[arg(long)]
    pub seed_end: Option<u32>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub seeds: SeedArgs,

    /// Keep trees whose latest mass is above this value
    #[arg(short, long)]
    pub min_mass: Option<u64>,

    /// Latest snapshot number
    #[arg(long)]
    pub snaps: Option<u32>,

    /// Snapshots followed back per tree
    #[arg(long)]
    pub steps: Option<usize>,

    /// Files per snapshot
    #[arg(long)]
    pub chunks: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Show config file locations
    Path,
    /// Print a commented template config
    Template,
}
