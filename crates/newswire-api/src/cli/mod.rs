//! CLI command definitions for the `nwire` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod article;
pub mod budget;
pub mod cache;
pub mod process;

use clap::{Parser, Subcommand};

/// Smallest and largest article count accepted by `process`.
pub const MIN_COUNT: u32 = 1;
pub const MAX_COUNT: u32 = 10;

/// Summarize and score news articles across LLM providers.
#[derive(Parser)]
#[command(name = "nwire", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log detail on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch headlines and run them through the summarization pipeline.
    Process {
        /// NewsAPI category (business, technology, science, ...).
        #[arg(short, long, default_value = "technology")]
        category: String,

        /// Number of articles, clamped to 1..=10.
        #[arg(short = 'n', long, default_value_t = 3)]
        count: u32,

        /// Process one article at a time instead of in parallel.
        #[arg(long, conflicts_with = "concurrency")]
        sequential: bool,

        /// Articles in flight at once (defaults to `max_concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List stored articles, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Search stored titles and summaries.
    Search {
        keyword: String,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one stored article by URL.
    Show { url: String },

    /// Show the daily budget, provider pricing and routing.
    Budget,

    /// Manage the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Delete every cached response.
    Clear,
    /// Show entry count and cache location.
    Stats,
}

/// Clamp a requested article count to the accepted range.
pub fn clamp_count(count: u32) -> u32 {
    count.clamp(MIN_COUNT, MAX_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_defaults() {
        let cli = Cli::parse_from(["nwire", "process"]);
        match cli.command {
            Commands::Process {
                category,
                count,
                sequential,
                concurrency,
            } => {
                assert_eq!(category, "technology");
                assert_eq!(count, 3);
                assert!(!sequential);
                assert!(concurrency.is_none());
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nwire", "list", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.otel);
    }

    #[test]
    fn test_sequential_conflicts_with_concurrency() {
        let result = Cli::try_parse_from(["nwire", "process", "--sequential", "--concurrency", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_count_is_clamped() {
        assert_eq!(clamp_count(0), 1);
        assert_eq!(clamp_count(5), 5);
        assert_eq!(clamp_count(50), 10);
    }
}
