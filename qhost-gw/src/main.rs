//! qhost-gw - dual-grammar query gateway
//!
//! Serves `/graphql` for native clients and legacy REST-style series
//! clients alike, backed by the on-disk tick data store.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qhost_common::config::{resolve_data_root, TomlConfig};
use qhost_gw::backend::LocalDataBackend;
use qhost_gw::dispatch::translate::RoutingTags;
use qhost_gw::native::StaticSchema;
use qhost_gw::{build_router, AppState};

/// Command-line arguments for qhost-gw
#[derive(Parser, Debug)]
#[command(name = "qhost-gw")]
#[command(about = "Dual-grammar query gateway")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "QHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder of the tick data store
    #[arg(short, long, env = "QHOST_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(short, long, env = "QHOST_BIND")]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting qhost gateway v{}", env!("CARGO_PKG_VERSION"));

    let data_root = resolve_data_root(args.data_root.as_deref(), &config);
    info!("Data root: {}", data_root.display());
    if !data_root.exists() {
        tracing::warn!(
            "Data root {} does not exist; legacy requests will fall back to native handling",
            data_root.display()
        );
    }

    let backend = LocalDataBackend::new(
        data_root,
        Duration::from_millis(config.backend.timeout_ms),
    );
    let tags = RoutingTags {
        source: config.legacy.source.clone(),
        interface: config.legacy.interface.clone(),
    };
    info!(
        "Legacy requests routed to source '{}' with interface '{}'",
        tags.source, tags.interface
    );

    let state = AppState::new(Arc::new(backend), Arc::new(StaticSchema::greeting()), tags)
        .with_max_body_bytes(config.server.max_body_bytes);
    let app = build_router(state);

    let addr = match args.bind {
        Some(addr) => addr,
        None => config
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind_addr '{}'", config.bind_addr))?,
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("qhost-gw listening on http://{}", addr);
    info!("GraphQL endpoint: http://{}/graphql", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
