//! tenantmux Server
//!
//! Serves one SSE stream per tenant and routes tenant commands onto it.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use tenantmux_core::config::load_config;
use tenantmux_core::tracing_init::init_tracing;
use tenantmux_core::{CloseReason, SessionRegistry, TenantDirectory};
use tenantmux_server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "tenantmux")]
#[command(version, about = "Multi-tenant SSE stream server")]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "TENANTMUX_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and environment).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Seconds between keep-alive frames on open streams.
    #[arg(long)]
    heartbeat_secs: Option<u64>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("tenantmux_server=info,tenantmux_core=info", args.log_json)?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(secs) = args.heartbeat_secs {
        config.sessions.heartbeat_interval_secs = secs;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        tenants = config.tenants.len(),
        heartbeat_secs = config.sessions.heartbeat_interval_secs,
        "Starting tenantmux"
    );

    let directory = TenantDirectory::with_tenants(config.tenants);
    let registry = SessionRegistry::new(config.sessions);
    let app = build_router(AppState::new(directory, registry.clone()));

    let listener = tokio::net::TcpListener::bind(config.server.addr).await?;
    info!(addr = %config.server.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await?;

    info!("tenantmux stopped");
    Ok(())
}

/// Resolves on Ctrl-C after closing every open stream, so in-flight SSE
/// bodies finish and graceful shutdown can complete.
async fn shutdown_signal(registry: SessionRegistry) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");
    let closed = registry.close_all(CloseReason::Shutdown).await;
    info!(closed, "Open streams closed");
}
