//! # courierd
//!
//! Courier delivery server binary. Loads settings, starts the sweeper and
//! serves the WebSocket and long-poll endpoints until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use courier_delivery::ClientCache;
use courier_server::{
    CourierServer, InboundHandler, InboundMessage, ServerConfig, TokenAuthenticator,
};
use courier_settings::CourierSettings;
use serde_json::json;

/// Courier delivery server.
#[derive(Parser, Debug)]
#[command(name = "courierd", about = "Courier message delivery server")]
struct Cli {
    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut CourierSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// Replies to each inbound payload on the sender's own session.
struct EchoInboundHandler;

#[async_trait]
impl InboundHandler for EchoInboundHandler {
    async fn handle(&self, cache: &Arc<ClientCache>, message: InboundMessage) {
        let Some(client) = cache.client_for(&message.context) else {
            tracing::debug!(connection_id = %message.context.connection_id, "echo target gone");
            return;
        };
        let _ = cache.send_to_client(&client, json!({ "echo": message.data }));
    }
}

fn init_logging(settings: &CourierSettings) {
    if settings.logging.json {
        courier_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        courier_core::logging::init_subscriber(&settings.logging.level);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(courier_settings::settings_path);
    let mut settings = courier_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    init_logging(&settings);

    let metrics_handle =
        courier_server::metrics::install_recorder().context("Failed to install metrics")?;

    let auth = TokenAuthenticator::from_settings(&settings.auth);
    if auth.is_empty() {
        tracing::warn!("no users configured, every request will be rejected");
    }

    let cache = Arc::new(ClientCache::new(courier_server::cache_config(&settings)));
    let sweeper = cache.spawn_sweeper();

    let server = CourierServer::new(
        ServerConfig::from_settings(&settings),
        cache.clone(),
        auth,
        metrics_handle,
    )
    .with_inbound_handler(Arc::new(EchoInboundHandler));

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        users = settings.auth.users.len(),
        "courier listening on http://{addr}"
    );

    courier_server::wait_for_signal().await;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(&cache, vec![handle, sweeper], None)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
