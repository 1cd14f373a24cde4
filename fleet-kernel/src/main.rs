/**
 * FLEET KERNEL - Entry point of the central bot API
 *
 * ROLE: wires config, logging, the device registry, its liveness sweeper and
 * the HTTP server together.
 *
 * ARCHITECTURE: one owned registry (per-device locks) shared by Axum handlers
 * and a background sweep task. All state is in memory.
 */

mod analytics;
mod config;
mod error;
mod health;
mod http;
mod models;
mod registry;
mod state;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::registry::{DeviceRegistry, SharedDeviceRegistry};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // .env is optional

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config().await;

    let registry: SharedDeviceRegistry = Arc::new(DeviceRegistry::new(&cfg));
    DeviceRegistry::start_device_monitoring(registry.clone());

    let app = http::build_router(AppState {
        registry,
        health: HealthTracker::new(),
    });

    let addr = cfg.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] fleet kernel listening on http://{addr}");
    axum::serve(listener, app).await.context("http server stopped")?;
    Ok(())
}
