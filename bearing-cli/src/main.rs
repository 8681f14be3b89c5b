//! Bearing CLI - Command-line interface
//!
//! Acquires position fixes from a fix recording and resolves addresses
//! through the remote geocoding service.

mod commands;
mod error;
mod replay;

use std::path::PathBuf;
use std::time::Duration;

use bearing::geocoding::GeocodeQuery;
use clap::{Parser, Subcommand};

use commands::common::{duration_arg, AccuracyArg, CliContext, GlobalOptions, OutputFormat};
use commands::geocode::GeocodeOptions;
use error::CliError;

#[derive(Parser)]
#[command(name = "bearing")]
#[command(version, about = "Position fixes and address lookups", long_about = None)]
struct Cli {
    /// Config file (default: ~/.bearing/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Accuracy tier, overriding the config file
    #[arg(long, global = true, value_enum)]
    accuracy: Option<AccuracyArg>,

    /// Single-shot timeout such as 10s or 500ms (0 waits forever)
    #[arg(long, global = true, value_parser = duration_arg)]
    timeout: Option<Duration>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one position fix
    Locate {
        /// JSON array of recorded fixes to play back
        #[arg(long)]
        fixes: PathBuf,
    },

    /// Print position fixes until the recording ends or Ctrl-C
    Track {
        /// JSON array of recorded fixes to play back
        #[arg(long)]
        fixes: PathBuf,

        /// Minimum movement in metres between printed fixes
        #[arg(long)]
        displacement: Option<f64>,
    },

    /// Look up addresses matching a place name or address
    Geocode {
        /// Free-text query
        query: String,

        /// Maximum number of results
        #[arg(long)]
        results: Option<usize>,

        /// Language tag for results (e.g. "de")
        #[arg(long)]
        language: Option<String>,
    },

    /// Look up addresses at a coordinate pair
    Reverse {
        /// Latitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        latitude: f64,

        /// Longitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        longitude: f64,

        /// Maximum number of results
        #[arg(long)]
        results: Option<usize>,

        /// Language tag for results (e.g. "de")
        #[arg(long)]
        language: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .map_err(CliError::Runtime)
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = CliContext::new(GlobalOptions {
        config: cli.config,
        accuracy: cli.accuracy,
        timeout: cli.timeout,
        verbose: cli.verbose,
        output: cli.output,
    })?;

    match cli.command {
        Commands::Locate { fixes } => commands::locate::locate(&ctx, &fixes).await,
        Commands::Track {
            fixes,
            displacement,
        } => commands::locate::track(&ctx, &fixes, displacement).await,
        Commands::Geocode {
            query,
            results,
            language,
        } => {
            commands::geocode::run(
                &ctx,
                GeocodeQuery::Forward(query),
                &GeocodeOptions { results, language },
            )
            .await
        }
        Commands::Reverse {
            latitude,
            longitude,
            results,
            language,
        } => {
            commands::geocode::run(
                &ctx,
                GeocodeQuery::Reverse {
                    latitude,
                    longitude,
                },
                &GeocodeOptions { results, language },
            )
            .await
        }
    }
}
