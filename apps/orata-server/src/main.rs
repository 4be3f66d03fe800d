mod config;
mod logging;
mod server;
mod signals;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use spatial_features::SpatialFeatures;

use crate::config::{AppConfig, CliOverrides, redact_dsn_password};

/// Orata - CRUD and spatial queries over PostGIS tables
#[derive(Parser)]
#[command(name = "orata-server")]
#[command(about = "Orata - CRUD and spatial queries over PostGIS tables")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config
        && !Path::new(path).is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    let overrides = CliOverrides {
        port: cli.port,
        verbose: cli.verbose,
    };
    let config = AppConfig::load(cli.config.as_deref(), &overrides)?;

    let _log_guard = logging::init_logging(&config.logging)?;

    if cli.print_config {
        println!("{}", config.to_redacted_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    println!("Configuration is valid");
    println!("{}", config.to_redacted_yaml()?);
    Ok(())
}

async fn run_server(config: &AppConfig) -> Result<()> {
    tracing::info!(
        database = %redact_dsn_password(&config.database.url)?,
        schema = %config.spatial.schema,
        "Orata server starting"
    );

    let module = SpatialFeatures::connect(&config.database, &config.spatial).await?;
    let router = server::build_router(&module, &config.server);

    server::serve(router, &config.server, signals::shutdown_signal()).await
}
