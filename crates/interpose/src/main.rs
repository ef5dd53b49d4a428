use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use interpose::{LoggingCallbacks, PayloadPrinter, Proxy};

mod config;

use config::{Overrides, RelayConfig};

/// Interpose - relay TCP connections to a fixed address and watch the traffic
#[derive(Parser, Debug)]
#[command(name = "interpose")]
#[command(about = "Transparent TCP relay with connection and payload logging")]
struct Args {
    /// Path to configuration file (optional)
    #[arg(short, long, default_value = "interpose.toml")]
    config: String,

    /// Listen address (default localhost:9997)
    #[arg(short, long)]
    local: Option<String>,

    /// Remote address every connection is forwarded to
    #[arg(short, long)]
    remote: Option<String>,

    /// Network family: tcp, tcp4 or tcp6
    #[arg(long)]
    network: Option<String>,

    /// Log the contents of every relayed chunk
    #[arg(long)]
    dump_payload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("interpose=info".parse()?))
        .init();

    let args = Args::parse();

    let config = RelayConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?
        .resolve(Overrides {
            network: args.network,
            listen: args.local,
            forward: args.remote,
            dump_payload: args.dump_payload,
        })
        .context("Invalid relay configuration")?;

    let proxy = Proxy::new(config.network, &config.listen, &config.forward)
        .await
        .context("Failed to resolve relay addresses")?;

    let proxy = if config.dump_payload {
        proxy.with_callbacks(PayloadPrinter)
    } else {
        proxy.with_callbacks(LoggingCallbacks)
    };

    tracing::info!(
        "Relaying {} {} -> {}",
        proxy.network(),
        proxy.listen_addr(),
        proxy.forward_addr()
    );

    let shutdown = proxy.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, closing connections...");
        shutdown.cancel();
    });

    proxy.serve().await.context("Relay stopped")?;

    tracing::info!("Relay shutdown complete");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
