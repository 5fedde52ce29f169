//! soilscan - NIR soil carbon batch analysis from the command line

mod commands;
mod events;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;
use soilscan::logging::init_logging;

use commands::analyze::{analyze, AnalyzeOptions};
use state::AppState;

#[derive(Parser)]
#[command(name = "soilscan")]
#[command(about = "Upload NIR spectral scans and predict soil carbon content")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/soilscan/config.json)
    #[arg(short, long, global = true, env = "SOILSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload up to four CSV scans as one batch and print the prediction
    Analyze {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print a JSON response
        #[arg(long)]
        json: bool,

        /// Submit files that fail the format or size checks
        #[arg(long)]
        force: bool,
    },

    /// Show the workflow steps
    Steps {
        /// Print a JSON response
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (files, json, force) = match cli.command {
        Commands::Steps { json } => {
            commands::steps::print_steps(json);
            return ExitCode::SUCCESS;
        }
        Commands::Analyze { files, json, force } => (files, json, force),
    };

    let state = match AppState::load(cli.config.as_deref()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut logging = state.config.logging.clone();
    logging.json |= cli.json_logs;
    if let Err(e) = init_logging(&logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting soilscan v{}", env!("CARGO_PKG_VERSION"));
    match &state.config_path {
        Some(path) => info!("Loaded config from {:?}", path),
        None => info!("No config file found, using defaults"),
    }
    info!("Using API at {}", state.config.api.base_url);

    let options = AnalyzeOptions { files, json, force };
    if analyze(&state, &options).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
