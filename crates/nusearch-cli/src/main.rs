//! NuSearch CLI
//!
//! Command-line interface for NuSearch index administration.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

use std::process::ExitCode;

use clap::Parser;
use nusearch_cli::cli::{Args, Command};
use nusearch_cli::commands::{self, IndexOptions, SearchOptions};
use nusearch_cli::config_handlers::handle_config_command;
use nusearch_cli::logging::init_logging;
use nusearch_core::NuSearchConfig;

/// Exit status for failures worth retrying later (EX_TEMPFAIL).
const EXIT_TEMPORARY_FAILURE: u8 = 75;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            let retryable = e
                .downcast_ref::<nusearch_cli::Error>()
                .is_some_and(nusearch_cli::Error::is_retryable);
            if retryable {
                ExitCode::from(EXIT_TEMPORARY_FAILURE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args.config.as_deref();
    let load = || NuSearchConfig::load(config_path).map_err(nusearch_cli::Error::from);

    match args.command {
        Command::Config { action } => {
            handle_config_command(config_path, action).map_err(nusearch_cli::Error::from)?;
        }
        Command::Index {
            source_dir,
            limit,
            dry_run,
        } => {
            let config = load()?;
            let engine = commands::connect(&config, dry_run)?;
            let options = IndexOptions {
                source_dir,
                limit,
                dry_run,
            };
            commands::cmd_index(engine, &config, &options).await?;
        }
        Command::Promote { generation } => {
            let config = load()?;
            let engine = commands::connect(&config, false)?;
            commands::cmd_promote(engine, &config, &generation).await?;
        }
        Command::Generations => {
            let config = load()?;
            let engine = commands::connect(&config, false)?;
            commands::cmd_generations(engine, &config).await?;
        }
        Command::Search {
            query,
            page,
            page_size,
            sort,
            author,
        } => {
            let config = load()?;
            let engine = commands::connect(&config, false)?;
            let options = SearchOptions {
                query,
                page,
                page_size,
                sort,
                author,
            };
            commands::cmd_search(engine, &config, &options).await?;
        }
    }
    Ok(())
}
