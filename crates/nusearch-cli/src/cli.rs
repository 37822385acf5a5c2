//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nusearch_index::SearchSort;

/// NuSearch - zero-downtime package search indexing
#[derive(Parser, Debug)]
#[command(name = "nusearch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a new generation from a package dump and make it live
    Index {
        /// Dump directory (defaults to source.package_path)
        source_dir: Option<PathBuf>,

        /// Read at most this many packages
        #[arg(long)]
        limit: Option<usize>,

        /// Run against an in-memory engine instead of the cluster
        #[arg(long)]
        dry_run: bool,
    },

    /// Point the live alias at an existing generation
    Promote {
        /// Generation name, e.g. nusearch-20240101-120000-000
        generation: String,
    },

    /// List generations and their aliases
    Generations,

    /// Query the live alias and print JSON results
    Search {
        /// Free-text query (empty matches everything)
        query: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Hits per page (defaults to search.default_page_size)
        #[arg(long)]
        page_size: Option<usize>,

        /// Ordering: relevance, downloads or recent
        #[arg(long, default_value_t = SearchSort::Relevance)]
        sort: SearchSort,

        /// Only packages with this exact author name
        #[arg(long)]
        author: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
    /// Print one value by dotted key, e.g. bulk.batch_size
    Get {
        /// Dotted key
        key: String,
    },
    /// Write a default config file
    Init {
        /// Target file (defaults to the platform config path)
        #[arg(long)]
        file: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print settings as NUSEARCH_* environment variables
    Export {
        /// Format as docker --env flags
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
