//! agentrelay - health-aware agent routing service

use agentrelay::config::RelayConfig;
use agentrelay::observability::logging::{init_logging, LogSettings};
use agentrelay::server::RelayServer;
use agentrelay::system::RelaySystem;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};

/// Health-aware routing of requests across LLM-backed agents
#[derive(Parser)]
#[command(name = "agentrelay")]
#[command(about = "Health-aware routing of requests across LLM-backed agents")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AGENTRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API with background health probing
    Serve {
        /// Override [server] port
        #[arg(short, long, env = "AGENTRELAY_PORT")]
        port: Option<u16>,
    },
    /// Validate configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
    /// Run one health probe cycle and print the report as JSON
    Probe,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_settings = LogSettings::from_env();
    match cli.verbose {
        0 => {}
        1 => log_settings.level = Level::DEBUG,
        _ => log_settings.level = Level::TRACE,
    }
    init_logging(log_settings);

    info!("Starting agentrelay v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Probe => probe_once(config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&std::path::Path>,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RelayConfig::load_from_file(path)?);
    }

    for candidate in ["relay.toml", "config/relay.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RelayConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create relay.toml".into())
}

async fn serve(config: RelayConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.server.port);
    let system = Arc::new(RelaySystem::new(config));

    // A failed setup still serves: /health reports 503 and /chat degrades
    match system.initialize() {
        Ok(()) => system.start_background_probing(),
        Err(e) => warn!(error = %e, "Serving without a working runtime"),
    }

    RelayServer::new(Arc::clone(&system), port)
        .run_until(shutdown_signal())
        .await?;

    system.shutdown();
    info!("Application shutdown complete");
    Ok(())
}

async fn probe_once(config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let system = RelaySystem::new(config);
    system.initialize()?;

    let report = system.health_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_config_command(config: &RelayConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(
        providers = config.providers.len(),
        endpoints = config.endpoints.len(),
        agents = config.agents.len(),
        "Configuration is valid"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}
