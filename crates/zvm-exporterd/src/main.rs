//! zvm-exporterd — Prometheus exporter for z/VM Cloud Connector.
//!
//! # Usage
//!
//! ```text
//! zvm-exporterd --config /etc/zvm-exporter.toml serve
//! zvm-exporterd --config /etc/zvm-exporter.toml check
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zvm_core::ExporterConfig;
use zvm_exporterd::{Exporter, check_config};

const DEFAULT_LOG_FILTER: &str = "info,zvm_exporterd=debug,zvm=debug";

#[derive(Parser)]
#[command(name = "zvm-exporterd", about = "Prometheus exporter for z/VM Cloud Connector")]
struct Cli {
    /// Configuration file. Built-in defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the exporter.
    Serve {
        /// Override `listen_port` from the configuration.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate the configuration and exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.listen_port = port;
            }
            run_serve(config).await
        }
        Command::Check => run_check(&config),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ExporterConfig> {
    match path {
        Some(path) => {
            let config = ExporterConfig::from_file(path)?;
            info!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => {
            info!("no configuration file given, using defaults");
            Ok(ExporterConfig::default())
        }
    }
}

async fn run_serve(config: ExporterConfig) -> anyhow::Result<()> {
    info!("zvm exporter starting");

    let exporter = Exporter::from_config(&config)?;
    let addr = exporter.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    exporter.serve(listener, shutdown_signal()).await?;

    info!("zvm exporter stopped");
    Ok(())
}

fn run_check(config: &ExporterConfig) -> anyhow::Result<()> {
    let (kinds, _) = check_config(config)?;
    let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
    println!("configuration ok");
    println!("  listen:     {}", config.listen_addr());
    println!("  collectors: {}", names.join(", "));
    for connector in &config.connectors {
        println!("  connector:  {} -> {}", connector.name, connector.url);
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
