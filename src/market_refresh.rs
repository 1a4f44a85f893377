use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::Config;
use crate::db::{markets::upsert_markets, ConfigStore, PriceSnapshot, PriceStore};
use crate::error::Result;
use crate::fetcher::{fetch_active_markets, MarketWithPrices};
use crate::state::MarketStore;
use crate::types::DetectionConfig;

/// Periodically re-syncs active markets from Gamma. Each cycle swaps the cache
/// wholesale and records one price snapshot per outcome token, which is what the
/// detector's price windows are computed from.
pub struct MarketRefresher {
    cfg: Config,
    store: Arc<MarketStore>,
    config: ConfigStore,
    prices: PriceStore,
    pool: sqlx::SqlitePool,
    health: Arc<HealthState>,
}

impl MarketRefresher {
    pub fn new(
        cfg: Config,
        store: Arc<MarketStore>,
        config: ConfigStore,
        prices: PriceStore,
        pool: sqlx::SqlitePool,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            cfg,
            store,
            config,
            prices,
            pool,
            health,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.cfg.market_refresh_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // bootstrap already ran the first sync

        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh().await {
                error!("Market refresh failed: {e}");
            }
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let detection = self.config.get_config().await?;
        let (fetched, stats) = fetch_active_markets(
            &self.cfg,
            &detection.blocklist_categories,
            &detection.blocklist_keywords,
        )
        .await?;

        let now = Utc::now();
        let snapshots = price_snapshots(&fetched);
        let markets: Vec<_> = fetched.into_iter().map(|f| f.market).collect();

        if let Err(e) = upsert_markets(&self.pool, &markets).await {
            warn!("Market metadata upsert failed: {e}");
        }
        self.store.replace_all(markets);

        let recorded = self.prices.record_snapshots(&snapshots, now).await?;
        let cutoff = prune_cutoff(now, self.cfg.snapshot_retention_hours, &detection);
        let pruned = self.prices.prune_older_than(cutoff).await?;

        self.health
            .set_last_refresh_at_ms(now.timestamp_millis().max(0) as u64);

        info!(
            markets = self.store.market_count(),
            snapshots = recorded,
            pruned,
            blocked = stats.rejected_blocked,
            low_volume = stats.rejected_low_volume,
            closed = stats.rejected_closed,
            no_tokens = stats.rejected_no_tokens,
            "Market refresh complete"
        );
        Ok(())
    }
}

/// Snapshots before this instant can go. Retention is stretched to the longest
/// trigger window so no window loses its oldest observation.
fn prune_cutoff(now: DateTime<Utc>, retention_hours: i64, detection: &DetectionConfig) -> DateTime<Utc> {
    let keep_minutes = (retention_hours * 60).max(i64::from(detection.longest_window_minutes()));
    now - chrono::Duration::minutes(keep_minutes)
}

/// One snapshot per outcome token that has a usable 0..1 price.
fn price_snapshots(fetched: &[MarketWithPrices]) -> Vec<PriceSnapshot> {
    let mut out = Vec::with_capacity(fetched.len() * 2);
    for f in fetched {
        let pairs = [
            (&f.market.yes_token_id, f.yes_price),
            (&f.market.no_token_id, f.no_price),
        ];
        for (token_id, price) in pairs {
            let Some(price) = price else { continue };
            if token_id.is_empty() || !(0.0..=1.0).contains(&price) {
                continue;
            }
            out.push(PriceSnapshot {
                token_id: token_id.clone(),
                market_id: f.market.id.clone(),
                price,
            });
        }
    }
    out
}
