//! chainsocks - Multi-user SOCKS5 chaining gateway
//!
//! This is the main entry point for the chainsocks daemon.

use anyhow::{Context, Result};
use chainsocks::chain::ChainTable;
use chainsocks::config::load_config;
use chainsocks::{control, server};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// chainsocks - forward each user's CONNECTs through their own proxy chain
#[derive(Parser, Debug)]
#[command(name = "chainsocks")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // An unreadable or invalid config is fatal at startup; reload failures
    // later keep the running snapshot instead.
    let config = load_config(&args.config)?;

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(level, args.json_log || config.general.json_log)?;

    info!("chainsocks v{}", chainsocks::VERSION);
    info!("configuration loaded from {:?}", args.config);
    info!("{} user chains configured", config.chains.len());

    let table = Arc::new(ChainTable::from_chains(&config.chains));

    let listen_addr = config.general.listen_addr();
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    info!("listening on {}", listen_addr);

    // Shutdown signal fan-out
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to setup SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, shutting down...");
        }

        let _ = shutdown_signal.send(());
    });

    // Control plane: health probing, cache expiry, hot reload
    control::spawn_health_checks(table.clone(), config.general.clone(), shutdown_tx.clone());
    control::spawn_cache_cleanup(
        table.clone(),
        config.general.chain_cleanup_interval,
        shutdown_tx.clone(),
    );
    control::spawn_config_reload(
        args.config.clone(),
        table.clone(),
        config.general.config_reload_interval,
        shutdown_tx.clone(),
    );

    server::run_server(listener, config.general, table, shutdown_tx).await;

    info!("all sessions finished, exiting");
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
