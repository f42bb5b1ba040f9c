//! Parley server: a WhatsApp webhook in front of an MCP-backed agent.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use parley_core::tools::inspect_provider;
use parley_core::{config::load_config, LifecycleManager, ParleyConfig};
use parley_server::{
    build_router, shutdown_signal, AppState, LogTransport, OutboundTransport, ServerConfig,
    TwilioTransport,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Parley Server - answer WhatsApp messages with an MCP-backed agent")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, default_value = "parley.yaml", help = "Path to the configuration file")]
    config: String,

    #[clap(long, default_value = "127.0.0.1:8000")]
    bind_addr: String,

    #[clap(long, short, help = "Log level (defaults to logging.level from the configuration)")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server (default command)
    Run,
    /// Start the tool provider, print the tools it advertises and exit
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(LevelFilter::Info))
        .init();
    log::info!("Configuration loaded for agent: {}", config.agent.name);

    match cli.command {
        Some(Commands::Tools) => list_tools(config).await,
        Some(Commands::Run) | None => run_server(config, cli.bind_addr).await,
    }
}

async fn run_server(config: ParleyConfig, bind_addr: String) -> Result<()> {
    let manager = Arc::new(LifecycleManager::new(config));
    manager
        .initialize()
        .await
        .context("Failed to start the agent session")?;

    let transport: Arc<dyn OutboundTransport> = match TwilioTransport::from_env() {
        Ok(twilio) => Arc::new(twilio),
        Err(e) => {
            log::warn!("Twilio delivery disabled ({}); replies will only be logged", e);
            Arc::new(LogTransport)
        }
    };

    let server_config = ServerConfig::new().with_bind_addr(bind_addr);
    let router = build_router(AppState::new(manager.clone(), transport), &server_config);

    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind_addr))?;
    log::info!("Parley server listening on {}", server_config.bind_addr);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = manager.shutdown().await {
        log::warn!("Error while closing the tool provider: {}", e);
    }
    served.context("Server failed")?;

    log::info!("Parley server shut down gracefully.");
    Ok(())
}

async fn list_tools(config: ParleyConfig) -> Result<()> {
    let listing = inspect_provider(&config.tool_provider)
        .await
        .context("Failed to list tools from the tool provider")?;

    println!("Connected to {}", listing.server_info);
    println!("{} tools available:", listing.tools.len());
    for metadata in listing.tools {
        println!("  {:<28} {}", metadata.name, metadata.description);
    }
    Ok(())
}
