//! Caching reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                CACHING PROXY                 │
//!                     │                                              │
//!   Client Request    │  ┌────────┐    ┌─────────┐    ┌───────────┐  │
//!   ──────────────────┼─▶│  http  │───▶│ handler │───▶│ forwarder │──┼──▶ Origin
//!                     │  │ server │    │         │    └─────┬─────┘  │
//!                     │  └────────┘    └────┬────┘          │        │
//!                     │                     │ HIT     codec │ MISS   │
//!                     │                     ▼               ▼        │
//!   Client Response   │               ┌────────────────────────┐     │
//!   ◀─────────────────┼───────────────│  cache (path → bytes)  │     │
//!   X-Cache-Status    │               └────────────────────────┘     │
//!                     │                                              │
//!                     │   config · observability · lifecycle        │
//!                     └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use caching_proxy::config::{read_config, validate_config, ConfigError, OriginConfig, ProxyConfig};
use caching_proxy::lifecycle::signals::wait_for_signal;
use caching_proxy::observability::{logging, metrics};
use caching_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "caching-proxy")]
#[command(about = "HTTP caching reverse proxy for a single origin", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin URL, e.g. http://localhost:8081
    #[arg(short, long)]
    origin: Option<String>,

    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "caching-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %format!("{}://{}", config.origin.scheme, config.origin.host),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.trigger();
        }
    });

    HttpServer::new(config).run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// File (or defaults), then command-line overrides, then validation.
fn build_config(cli: &Cli) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(origin) = &cli.origin {
        config.origin = OriginConfig::from_url(origin)?;
    }
    if let Some(listen) = &cli.listen {
        config.listener.bind_address = listen.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
