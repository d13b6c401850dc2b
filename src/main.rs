//! ruxy - Two-hop SOCKS5 tunnel
//!
//! `ruxy local` runs the client-facing SOCKS5 broker; `ruxy remote` runs
//! the destination-facing relay. Both hops read the same configuration
//! file and share the symmetric key it names.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ruxy::{Config, LocalBroker, RemoteRelay};

/// CLI arguments for ruxy
#[derive(Parser, Debug)]
#[command(name = "ruxy")]
#[command(about = "Two-hop SOCKS5 tunnel: local broker + encrypted remote relay")]
#[command(version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the client-facing SOCKS5 broker
    Local,
    /// Run the destination-facing relay
    Remote,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args)?;

    info!("starting ruxy v{}", env!("CARGO_PKG_VERSION"));

    let config =
        Config::load_from_file(&args.config).context("configuration validation failed")?;

    if args.validate_config {
        info!("configuration is valid");
        info!("  socks5 listen: {}", config.local.listen_addr);
        info!(
            "  remote relay: {}:{} (tls: {})",
            config.local.remote_host, config.local.remote_port, config.local.tls
        );
        info!(
            "  relay listen: {} (tls: {})",
            config.remote.listen_addr, config.remote.tls
        );
        info!("  idle timeout: {:?}", config.relay.idle_timeout);
        return Ok(());
    }

    let config = Arc::new(config);
    match args.command {
        Command::Local => {
            let broker = LocalBroker::bind(config).await?;
            serve(broker.run()).await
        }
        Command::Remote => {
            let relay = RemoteRelay::bind(config).await?;
            serve(relay.run()).await
        }
    }
}

/// Run a hop until it fails or the process receives Ctrl+C.
async fn serve(task: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    tokio::select! {
        result = task => {
            if let Err(e) = &result {
                error!("server error: {e:#}");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
