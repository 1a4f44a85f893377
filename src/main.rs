mod api;
mod blocklist;
mod config;
mod db;
mod detector;
mod error;
mod fetcher;
mod market_refresh;
mod state;
mod types;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{default_detection_config, Config, CHANNEL_CAPACITY};
use crate::db::{AlertStore, AlertWriter, ConfigStore, PriceStore};
use crate::detector::{format_trigger_type, MovementDetector, MovementMonitor};
use crate::error::Result;
use crate::market_refresh::MarketRefresher;
use crate::state::MarketStore;
use crate::types::PriceMovement;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let config_store = ConfigStore::new(pool.clone());
    config_store.seed_if_missing(&default_detection_config()).await?;
    let prices = PriceStore::new(pool.clone());
    let alerts = AlertStore::new(pool.clone());

    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Bootstrap: first Gamma sync fills the cache and records a snapshot ---
    let store = MarketStore::new();
    let refresher = MarketRefresher::new(
        cfg.clone(),
        Arc::clone(&store),
        config_store.clone(),
        prices.clone(),
        pool.clone(),
        Arc::clone(&health),
    );
    refresher.refresh().await?;
    info!("Bootstrap complete: {} markets cached", store.market_count());

    let detector = Arc::new(MovementDetector::new(
        Arc::new(config_store.clone()),
        store.clone(),
        Arc::new(prices),
        Arc::new(alerts.clone()),
    ));

    // --- Channels ---
    let (movement_tx, movement_rx) = mpsc::channel::<PriceMovement>(CHANNEL_CAPACITY);
    let (write_tx, write_rx) = mpsc::channel::<PriceMovement>(CHANNEL_CAPACITY);

    // --- Spawn tasks ---

    // Market refresher (background, every MARKET_REFRESH_INTERVAL_SECS)
    tokio::spawn(async move { refresher.run().await });

    // Detection loop (background, every DETECTION_INTERVAL_SECS)
    let monitor = MovementMonitor::new(
        Arc::clone(&detector),
        movement_tx,
        Arc::clone(&health),
        Arc::clone(&latency),
        cfg.detection_interval_secs,
    );
    tokio::spawn(async move { monitor.run().await });

    // Alert persistence
    let writer = AlertWriter::new(alerts.clone(), write_rx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    // Movement consumer: telemetry logger + DB writer
    let consumer_health = Arc::clone(&health);
    tokio::spawn(async move {
        alert_consumer(movement_rx, write_tx, consumer_health).await;
    });

    // HTTP API server
    let api_state = ApiState {
        pool,
        detector,
        config: config_store,
        alerts,
        store,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Consumes detected movements: logs each one and queues it for the alert writer.
async fn alert_consumer(
    mut rx: mpsc::Receiver<PriceMovement>,
    writer_tx: mpsc::Sender<PriceMovement>,
    health: Arc<HealthState>,
) {
    while let Some(movement) = rx.recv().await {
        log_movement(&movement);
        health.inc_write_queue_pending();
        if let Err(e) = writer_tx.try_send(movement) {
            health.dec_write_queue_pending();
            warn!("Alert writer channel full: {e}");
        }
    }
}

fn log_movement(m: &PriceMovement) {
    let trigger_type = format_trigger_type(m.change_cents, m.window_minutes);
    info!(
        event = "PRICE_MOVEMENT",
        market_id = %m.market_id,
        token_id = %m.token_id,
        side = %m.side,
        price_before = m.price_before,
        price_after = m.price_after,
        change_cents = m.change_cents,
        trigger_type = %trigger_type,
        "MOVEMENT {} | {} {:+.1}c | {:.3} -> {:.3} | {}",
        trigger_type,
        m.side,
        m.change_cents,
        m.price_before,
        m.price_after,
        m.market.question,
    );
}
