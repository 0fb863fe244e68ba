//! # dishpatch
//!
//! Server binary: loads settings, starts logging and metrics, seeds the order
//! store, and serves HTTP + WebSocket until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dishpatch_core::OrderRecord;
use dishpatch_core::logging::{LogFormat, init_subscriber};
use dishpatch_server::config::ServerConfig;
use dishpatch_server::orders::InMemoryOrderStore;
use dishpatch_server::server::DishpatchServer;
use dishpatch_settings::DishpatchSettings;

/// How long in-flight sessions get to wind down after ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Real-time order status server.
#[derive(Parser, Debug)]
#[command(name = "dishpatch", about = "Real-time order status server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.dishpatch/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum concurrent WebSocket connections (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// JSON array of orders to preload into the store.
    #[arg(long)]
    seed_orders: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut DishpatchSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.format = LogFormat::Json;
        }
    }
}

/// Read a JSON array of order records.
fn load_seed_orders(path: &Path) -> Result<Vec<OrderRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed orders: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed orders: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(dishpatch_settings::settings_path);
    let mut settings = dishpatch_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings: {}", settings_path.display()))?;
    cli.apply(&mut settings);
    dishpatch_settings::validate(&settings).context("Invalid settings after CLI overrides")?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    tracing::info!(path = %settings_path.display(), "settings loaded");

    let metrics = dishpatch_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let store = match &cli.seed_orders {
        Some(path) => {
            let orders = load_seed_orders(path)?;
            tracing::info!(count = orders.len(), "seeded order store");
            InMemoryOrderStore::with_orders(orders)
        }
        None => InMemoryOrderStore::new(),
    };
    if settings.server.admin_token.is_none() {
        tracing::warn!("no admin token configured; status update endpoint will refuse all requests");
    }

    let config = ServerConfig::from(&settings.server);
    let server = DishpatchServer::new(config, Arc::new(store), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("dishpatch listening on http://{addr} (ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        connections = server.registry().len(),
        "shutting down"
    );
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_GRACE))
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}
