// src/main.rs

use anyhow::{Context, Result};
use smart_traffic_dashboard::engine::VideoAnalyzer;
use smart_traffic_dashboard::state::AppState;
use smart_traffic_dashboard::types::Config;
use smart_traffic_dashboard::web_api;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("TRAFFIC_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🚦 Smart Traffic Dashboard v{} starting", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!("✓ Configuration loaded from {}", config_path);
    } else {
        warn!("Config {} not found, using defaults", config_path);
    }

    info!(
        "Decision thresholds: congestion>{}, {}>{}",
        config.decision.congestion_threshold,
        config.decision.bus_class,
        config.decision.bus_priority_threshold
    );

    let analyzer = build_analyzer(&config)?;
    info!("✓ Video analyzer ready");

    let bind_addr = config.server.bind_addr.clone();
    let app = web_api::create_router(AppState::new(config, analyzer));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("📺 Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "vision")]
fn build_analyzer(config: &Config) -> Result<Arc<dyn VideoAnalyzer>> {
    use smart_traffic_dashboard::engine::OnnxVideoAnalyzer;

    Ok(Arc::new(OnnxVideoAnalyzer::new(config.clone())?))
}

#[cfg(not(feature = "vision"))]
fn build_analyzer(_config: &Config) -> Result<Arc<dyn VideoAnalyzer>> {
    anyhow::bail!("Built without the `vision` feature, no video analyzer available")
}
