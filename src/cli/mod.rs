//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "joblens",
    version,
    about = "Hybrid query routing and retrieval over production order data",
    long_about = "Joblens answers natural-language questions about production job orders by \
                  classifying intent, routing between direct record lookups and vector \
                  similarity search, and keeping a vector index synchronized with the order book."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/joblens/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a natural-language question about the order book
    Query {
        /// Question text
        query: String,

        /// Maximum number of orders to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Result ordering
        #[arg(short, long, value_enum, default_value = "score")]
        sort: SortArg,

        /// Bypass the result cache
        #[arg(long)]
        fresh: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Synchronize the vector index with the order book
    Sync {
        /// Rebuild the index from scratch instead of an incremental pass
        #[arg(long)]
        full: bool,
    },

    /// Show engine status: pending changes and cache population
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum SortArg {
    Score,
    DueDate,
    Priority,
}

impl From<SortArg> for crate::router::SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Score => crate::router::SortOrder::Score,
            SortArg::DueDate => crate::router::SortOrder::DueDate,
            SortArg::Priority => crate::router::SortOrder::Priority,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
