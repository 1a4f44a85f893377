use crate::error::{AppError, Result};
use crate::types::{DetectionConfig, Trigger};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Gamma `/events` page size.
pub const GAMMA_PAGE_SIZE: usize = 100;

/// Pagination stops once the offset passes this many events.
pub const GAMMA_MAX_OFFSET: usize = 5000;

/// Markets below this volume are never parsed out of the Gamma feed.
pub const SYNC_MIN_VOLUME_USD: f64 = 50_000.0;

/// HTTP timeout for Gamma requests (seconds).
pub const GAMMA_TIMEOUT_SECS: u64 = 30;

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Max token ids bound into a single snapshot query.
pub const PRICE_QUERY_CHUNK_SIZE: usize = 500;

/// Seed values for the persisted detection config.
pub mod detection_defaults {
    pub const MIN_VOLUME_USD: f64 = 50_000.0;
    pub const MIN_DAYS_TO_RESOLUTION: i64 = 2;
    pub const COOLDOWN_MINUTES: u32 = 60;
    pub const TRIGGER_CENTS: f64 = 5.0;
    pub const TRIGGER_MINUTES: u32 = 30;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between Gamma syncs; each sync also records a price snapshot (MARKET_REFRESH_INTERVAL_SECS)
    pub market_refresh_interval_secs: u64,
    /// Seconds between detection passes (DETECTION_INTERVAL_SECS)
    pub detection_interval_secs: u64,
    /// Price snapshots older than this are pruned (SNAPSHOT_RETENTION_HOURS)
    pub snapshot_retention_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "detector.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            market_refresh_interval_secs: std::env::var("MARKET_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60)
                .max(1),
            detection_interval_secs: std::env::var("DETECTION_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60)
                .max(1),
            snapshot_retention_hours: parse_retention_hours(
                &std::env::var("SNAPSHOT_RETENTION_HOURS").unwrap_or_else(|_| "24".to_string()),
            )?,
        })
    }
}

/// Retention must be a positive whole number of hours; anything else would prune
/// snapshots as soon as they are written.
fn parse_retention_hours(raw: &str) -> Result<i64> {
    match raw.trim().parse::<i64>() {
        Ok(hours) if hours > 0 => Ok(hours),
        _ => Err(AppError::Config(
            "SNAPSHOT_RETENTION_HOURS must be a positive number of hours".to_string(),
        )),
    }
}

/// Detection config written to an empty database on first start.
pub fn default_detection_config() -> DetectionConfig {
    use detection_defaults::*;
    DetectionConfig {
        min_volume_usd: MIN_VOLUME_USD,
        min_days_to_resolution: MIN_DAYS_TO_RESOLUTION,
        cooldown_minutes: COOLDOWN_MINUTES,
        alerts_paused: false,
        triggers: vec![Trigger {
            cents: TRIGGER_CENTS,
            minutes: TRIGGER_MINUTES,
        }],
        blocklist_categories: Vec::new(),
        blocklist_keywords: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_hours_must_be_positive() {
        assert_eq!(parse_retention_hours("24").unwrap(), 24);
        assert_eq!(parse_retention_hours(" 6 ").unwrap(), 6);
        for bad in ["0", "-1", "", "a day"] {
            assert!(
                matches!(parse_retention_hours(bad), Err(AppError::Config(_))),
                "accepted {bad:?}"
            );
        }
    }
}
