use std::sync::Arc;

use anyhow::{Context, Result};
use footfall_core::DedupResolver;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod service;
mod store;

use config::Config;
use dbus_interface::FootfallInterface;
use service::DetectionService;
use store::DetectionStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("footfalld starting");

    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }

    let store = DetectionStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening detection store at {}", config.db_path.display()))?;
    tracing::info!(db = %config.db_path.display(), "detection store opened");

    let resolver = DedupResolver::new(config.dedup());
    tracing::info!(
        window_hours = config.dedup_window_hours,
        match_threshold = config.match_threshold,
        iou_threshold = config.iou_threshold,
        "dedup resolver configured"
    );

    let service = Arc::new(DetectionService::new(store, resolver, config.recent_limit));

    let _conn = zbus::connection::Builder::session()?
        .name("org.footfall.Footfall1")?
        .serve_at("/org/footfall/Footfall1", FootfallInterface::new(service))?
        .build()
        .await
        .context("registering org.footfall.Footfall1 on the session bus")?;

    tracing::info!("footfalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("footfalld shutting down");

    Ok(())
}
