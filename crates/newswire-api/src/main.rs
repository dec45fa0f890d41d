//! Newswire CLI entry point.
//!
//! Binary name: `nwire`
//!
//! Parses CLI arguments, initializes tracing, config and the article
//! database, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{CacheCommand, Cli, Commands};
use newswire_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;
    tracing::debug!(data_dir = %state.data_dir.display(), db = %state.database_path().display(), "State initialized");

    match cli.command {
        Commands::Process {
            category,
            count,
            sequential,
            concurrency,
        } => {
            let args = cli::process::ProcessArgs {
                category,
                count,
                sequential,
                concurrency,
            };
            cli::process::process(&state, args, cli.json).await?;
        }

        Commands::List { limit } => {
            cli::article::list_articles(&state, limit, cli.json).await?;
        }

        Commands::Search { keyword, limit } => {
            cli::article::search_articles(&state, &keyword, limit, cli.json).await?;
        }

        Commands::Show { url } => {
            cli::article::show_article(&state, &url, cli.json).await?;
        }

        Commands::Budget => {
            cli::budget::budget(&state, cli.json).await?;
        }

        Commands::Cache { action } => match action {
            CacheCommand::Clear => cli::cache::clear_cache(&state, cli.json).await?,
            CacheCommand::Stats => cli::cache::cache_stats(&state, cli.json).await?,
        },
    }

    Ok(())
}
