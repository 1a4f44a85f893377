use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::markets::seen_markets;
use crate::db::models::{AlertRow, MarketRow};
use crate::db::{AlertStore, ConfigStore};
use crate::detector::MovementDetector;
use crate::error::AppError;
use crate::state::MarketStore;
use crate::types::{DetectionConfig, Market, PriceMovement};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub detector: Arc<MovementDetector>,
    pub config: ConfigStore,
    pub alerts: AlertStore,
    pub store: Arc<MarketStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/config", get(get_config).put(put_config))
        .route("/markets", get(get_markets))
        .route("/markets/seen", get(get_seen_markets))
        .route("/markets/:id/check", post(check_market))
        .route("/alerts/recent", get(get_recent_alerts))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub cached_markets: usize,
    pub markets_refreshed_at: Option<String>,
    pub last_refresh_at_ms: u64,
    pub last_detection_at_ms: u64,
    pub last_pass_movements: u64,
    pub last_pass_failed: bool,
    pub write_queue_pending: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        cached_markets: state.store.market_count(),
        markets_refreshed_at: state.store.refreshed_at().map(|t| t.to_rfc3339()),
        last_refresh_at_ms: state.health.last_refresh_at_ms(),
        last_detection_at_ms: state.health.last_detection_at_ms(),
        last_pass_movements: state.health.last_pass_movements(),
        last_pass_failed: state.health.last_pass_failed(),
        write_queue_pending: state.health.write_queue_pending(),
    })
}

async fn get_config(State(state): State<ApiState>) -> Result<Json<DetectionConfig>, AppError> {
    Ok(Json(state.config.get_config().await?))
}

async fn put_config(
    State(state): State<ApiState>,
    Json(cfg): Json<DetectionConfig>,
) -> Result<Json<DetectionConfig>, AppError> {
    state.config.update_config(&cfg).await?;
    Ok(Json(cfg))
}

async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<Market>> {
    let limit = params.limit.unwrap_or(100).max(0) as usize;
    let markets = state.store.all_markets().into_iter().take(limit).collect();
    Json(markets)
}

async fn get_seen_markets(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<MarketRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(seen_markets(&state.pool, limit).await?))
}

async fn check_market(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
) -> Result<Json<Vec<PriceMovement>>, AppError> {
    match state.detector.check_cached_market(&market_id).await? {
        Some(movements) => Ok(Json(movements)),
        None => Err(AppError::NotFound(format!("market {market_id} is not cached"))),
    }
}

async fn get_recent_alerts(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<AlertRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 1000);
    Ok(Json(state.alerts.recent_alerts(limit).await?))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    if state.latency.is_empty() {
        return Json(LatencyResponse {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
        });
    }
    let (p50, p95, p99) = state.latency.percentiles();
    let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1000.0);
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: to_ms(p50),
        p95_ms: to_ms(p95),
        p99_ms: to_ms(p99),
    })
}
