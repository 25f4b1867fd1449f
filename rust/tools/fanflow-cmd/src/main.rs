use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "fanflow-cmd")]
#[command(about = "Command-line utility for running and checking fanflow pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the primes below a limit
    Primes {
        /// Exclusive upper bound of the numbers tested
        #[arg(short, long, default_value_t = 1_000_000)]
        limit: u64,

        /// Number of worker threads (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Path to a JSON pipeline configuration; --workers overrides it
        #[arg(short, long)]
        config: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search for a prime at or above a threshold, stopping on the first match
    Find {
        /// Smallest value to consider
        #[arg(short, long)]
        threshold: u64,

        /// Give up at this value (searches without bound if not specified)
        #[arg(short, long)]
        limit: Option<u64>,

        /// Number of worker threads (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop the search after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Run repeated early-stopped pipelines and compare process thread counts
    LeakCheck {
        /// Number of pipeline runs
        #[arg(short, long, default_value_t = 100)]
        iterations: u64,

        /// Number of worker threads per run
        #[arg(short, long, default_value_t = 8)]
        workers: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Primes {
            limit,
            workers,
            config,
            json,
        } => commands::primes::run(limit, workers, config, json),
        Commands::Find {
            threshold,
            limit,
            workers,
            deadline_ms,
        } => commands::find::run(threshold, limit, workers, deadline_ms),
        Commands::LeakCheck {
            iterations,
            workers,
        } => commands::leak_check::run(iterations, workers),
    }
}
