//! OpenAI relay (v1)
//!
//! A single-upstream relay for OpenAI-compatible APIs, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ request id ─▶ trace ─▶ access control ─▶ route family
//!                                                                  │
//!                                                                  ▼
//!                                 header rewrite ◀─ stream decision ◀─ forwarder
//!                                       │
//!                                       ▼
//!                               request builder ─▶ client pool ─▶ Upstream
//!                                                                  │
//!     Client Response                                              │
//!     ◀───────────── buffered body / live chunk stream ◀───────────┘
//!                    (or error envelope)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use openai_relay::config::load_config;
use openai_relay::http::HttpServer;
use openai_relay::lifecycle::{shutdown_on_signal, Shutdown};
use openai_relay::observability::{init_logging, init_metrics};

#[derive(Debug, Parser)]
#[command(name = "openai-relay", version, about = "Relay OpenAI API calls to a single upstream")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config.observability)?;
    tracing::info!("openai-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        timeout_secs = config.upstream.timeout_secs,
        auth_enabled = config.auth.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
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
    let server_rx = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, server_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
