//! Host folder SFTP daemon
//!
//! Serves a host directory over SFTP and exits once the last client leaves.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use daemon::auth::AcceptAll;
use daemon::config::{Config, DEFAULT_PORT};
use daemon::identity::HostIdentity;
use daemon::network::{bind, SftpServer};

/// Host folder SFTP daemon - shares a host directory until the last client exits.
#[derive(Parser, Debug)]
#[command(name = "hostfolder-sftpd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on (a port set in the configuration takes precedence)
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    let overrides = config.apply_env_overrides()?;

    // Validate configuration
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }
    for variable in overrides {
        tracing::info!(variable, "Applied environment override");
    }

    let identity = HostIdentity::generate().context("unable to create host key")?;
    tracing::debug!(fingerprint = %identity.fingerprint(), "generated host key");

    let server = SftpServer::new(&config, &identity, Arc::new(AcceptAll))?;
    let addr = config.listen_address(cli.port);
    let listener = bind(&addr).await?;
    tracing::info!(
        address = %addr,
        root = %config.files.root.display(),
        read_only = config.files.read_only,
        policy = ?server.policy(),
        "Listening"
    );

    tokio::select! {
        result = server.serve(listener) => {
            result?;
            tracing::info!("last client exited, shutting down");
        }
        signal = wait_for_shutdown_signal() => {
            signal?;
            tracing::info!("Received shutdown signal");
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}
