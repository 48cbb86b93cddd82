use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use flight_stats_api::config::{load_config, ApiConfig};
use flight_stats_api::lifecycle;
use flight_stats_api::observability::logging;
use flight_stats_api::store::import::import_dataset;

#[derive(Parser)]
#[command(name = "flight-stats-api")]
#[command(about = "REST API over monthly airline delay statistics", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the API (default)
    Serve,
    /// Load an airline dataset (JSON) into the configured database
    Import {
        /// Path to the dataset file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ApiConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "flight-stats-api starting");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!(
                bind_address = %config.listener.bind_address,
                database = %config.database.path,
                api_root = %config.api.root,
                "Configuration loaded"
            );
            lifecycle::serve(config).await?;
            tracing::info!("Shutdown complete");
        }
        Commands::Import { file } => {
            let store = lifecycle::open_store(&config.database)?;
            let reader = BufReader::new(File::open(&file)?);
            let summary = import_dataset(&store, reader)?;
            tracing::info!(
                file = %file.display(),
                entries = summary.entries,
                new_statistics = summary.new_statistics,
                "Dataset imported"
            );
        }
    }

    Ok(())
}
