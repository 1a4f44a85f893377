/// Database row types matching `migrations/0001_init.sql`.
/// Used with `sqlx::query_as` for typed reads.

#[derive(Debug, sqlx::FromRow)]
pub struct DetectionConfigRow {
    pub min_volume_usd: f64,
    pub min_days_to_resolution: i64,
    pub cooldown_minutes: i64,
    pub alerts_paused: bool,
    /// JSON array of `{cents, minutes}`
    pub triggers: String,
    /// JSON array of strings
    pub blocklist_categories: String,
    /// JSON array of strings
    pub blocklist_keywords: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PriceSnapshotRow {
    pub token_id: String,
    pub price: f64,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub market_id: String,
    pub token_id: String,
    pub side: String,
    pub trigger_type: String,
    pub price_before: f64,
    pub price_after: f64,
    pub change_cents: f64,
    pub window_minutes: i64,
    pub sent_at: i64,
}

/// Latest stored metadata for a market the sync has seen, active or not.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct MarketRow {
    pub id: String,
    pub condition_id: String,
    pub question: String,
    pub category: String,
    pub end_date: Option<i64>,
    pub volume_24h: f64,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub updated_at: i64,
}
