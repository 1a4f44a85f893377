use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Snapshot of one binary market as of the last Gamma sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    pub event_slug: String,
    pub category: String,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub volume_24h: f64,
    /// Empty when the feed did not provide a YES token.
    pub yes_token_id: String,
    /// Empty when the feed did not provide a NO token.
    pub no_token_id: String,
}

impl Market {
    /// Outcome tokens in evaluation order: YES first, then NO. Missing tokens are skipped.
    pub fn outcome_tokens(&self) -> impl Iterator<Item = (Side, &str)> {
        [
            (Side::Yes, self.yes_token_id.as_str()),
            (Side::No, self.no_token_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, token)| !token.is_empty())
    }

    /// Whole days until resolution, rounded up. None when the market has no end date.
    pub fn days_to_resolution(&self, now: DateTime<Utc>) -> Option<i64> {
        let end = self.end_date?;
        let ms = (end - now).num_milliseconds();
        Some((ms as f64 / 86_400_000.0).ceil() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Side::Yes => "YES",
            Side::No => "NO",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Detection config
// ---------------------------------------------------------------------------

/// A (threshold, window) pair. Fires when an outcome moves at least `cents` within `minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub cents: f64,
    pub minutes: u32,
}

/// Global detection settings, read once per pass.
///
/// `triggers` is evaluated in list order; the first trigger that fires for a market wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub min_volume_usd: f64,
    pub min_days_to_resolution: i64,
    pub cooldown_minutes: u32,
    pub alerts_paused: bool,
    pub triggers: Vec<Trigger>,
    pub blocklist_categories: Vec<String>,
    pub blocklist_keywords: Vec<String>,
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_volume_usd.is_finite() || self.min_volume_usd < 0.0 {
            return Err(AppError::InvalidConfig(
                "min_volume_usd must be a non-negative number".to_string(),
            ));
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if !trigger.cents.is_finite() || trigger.cents <= 0.0 {
                return Err(AppError::InvalidConfig(format!(
                    "trigger {i}: cents must be positive"
                )));
            }
            if trigger.minutes == 0 {
                return Err(AppError::InvalidConfig(format!(
                    "trigger {i}: minutes must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Longest trigger window in minutes, 0 with no triggers.
    pub fn longest_window_minutes(&self) -> u32 {
        self.triggers.iter().map(|t| t.minutes).max().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Oldest and latest observed price (0..1) for one token inside a lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceWindow {
    pub oldest: Option<f64>,
    pub latest: Option<f64>,
    pub oldest_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Movement events
// ---------------------------------------------------------------------------

/// Emitted when an outcome price crossed a trigger threshold.
///
/// `change_cents` is the signed absolute move, `(price_after - price_before) * 100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMovement {
    pub market_id: String,
    pub market: Market,
    pub token_id: String,
    pub side: Side,
    pub price_before: f64,
    pub price_after: f64,
    pub change_cents: f64,
    pub window_minutes: u32,
    pub detected_at: DateTime<Utc>,
}
