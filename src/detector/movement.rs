use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::blocklist::is_market_blocked;
use crate::detector::sources::{ConfigProvider, CooldownSource, MarketSource, PriceWindowSource};
use crate::error::Result;
use crate::types::{DetectionConfig, Market, PriceMovement, PriceWindow, Side, Trigger};

/// Absorbs float noise so a move that reads as exactly N cents fires an N-cent trigger.
const CENTS_EPSILON: f64 = 1e-9;

/// Finds outcome prices that moved past a configured trigger.
///
/// Evaluation order is fixed: triggers in config order, then YES before NO.
/// The first outcome/trigger that fires for a market is the only movement
/// reported for it in a pass.
pub struct MovementDetector {
    config: Arc<dyn ConfigProvider>,
    markets: Arc<dyn MarketSource>,
    prices: Arc<dyn PriceWindowSource>,
    cooldowns: Arc<dyn CooldownSource>,
}

impl MovementDetector {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        markets: Arc<dyn MarketSource>,
        prices: Arc<dyn PriceWindowSource>,
        cooldowns: Arc<dyn CooldownSource>,
    ) -> Self {
        Self {
            config,
            markets,
            prices,
            cooldowns,
        }
    }

    /// Run one detection pass over every cached market.
    ///
    /// Any collaborator error aborts the pass; no partial list is returned.
    pub async fn detect_movements(&self) -> Result<Vec<PriceMovement>> {
        self.detect_movements_at(Utc::now()).await
    }

    /// As `detect_movements`, with `now` used for the days-to-resolution filter.
    pub async fn detect_movements_at(&self, now: DateTime<Utc>) -> Result<Vec<PriceMovement>> {
        let started = Instant::now();
        let config = self.config.get_config().await?;

        if config.alerts_paused {
            debug!("Alerts are paused, skipping detection");
            return Ok(Vec::new());
        }

        let eligible: Vec<Market> = self
            .markets
            .cached_markets()
            .into_iter()
            .filter(|m| is_eligible(m, &config, now))
            .collect();
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let market_ids: Vec<String> = eligible.iter().map(|m| m.id.clone()).collect();
        let cooling = self
            .cooldowns
            .markets_in_cooldown(&market_ids, config.cooldown_minutes)
            .await?;

        let to_check: Vec<Market> = eligible
            .into_iter()
            .filter(|m| !cooling.contains(&m.id))
            .collect();
        if to_check.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids: Vec<String> = to_check
            .iter()
            .flat_map(|m| m.outcome_tokens().map(|(_, token)| token.to_string()))
            .collect();

        let mut movements = Vec::new();
        let mut matched: HashSet<String> = HashSet::new();

        for trigger in &config.triggers {
            if matched.len() == to_check.len() {
                break;
            }
            let windows = self
                .prices
                .price_windows_batch(&token_ids, trigger.minutes)
                .await?;

            for market in &to_check {
                if matched.contains(&market.id) {
                    continue;
                }
                if let Some(movement) = first_fired_outcome(market, &windows, trigger) {
                    matched.insert(market.id.clone());
                    movements.push(movement);
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        if movements.is_empty() {
            debug!(
                markets_checked = to_check.len(),
                cooling = cooling.len(),
                duration_ms,
                "Detection complete, no movements"
            );
        } else {
            info!(
                count = movements.len(),
                markets_checked = to_check.len(),
                duration_ms,
                "Detected price movements"
            );
        }

        Ok(movements)
    }

    /// Check a single cached market against every trigger, ignoring eligibility
    /// and cooldown. Stops at the first trigger that fires. An unknown id yields
    /// an empty list.
    pub async fn check_market(&self, market_id: &str) -> Result<Vec<PriceMovement>> {
        Ok(self.check_cached_market(market_id).await?.unwrap_or_default())
    }

    /// As `check_market`, but None when the id is not in the cache.
    pub async fn check_cached_market(&self, market_id: &str) -> Result<Option<Vec<PriceMovement>>> {
        let Some(market) = self.markets.market_by_id(market_id) else {
            warn!(market_id, "Market not found in cache");
            return Ok(None);
        };

        let config = self.config.get_config().await?;
        let token_ids: Vec<String> = market
            .outcome_tokens()
            .map(|(_, token)| token.to_string())
            .collect();

        for trigger in &config.triggers {
            let windows = self
                .prices
                .price_windows_batch(&token_ids, trigger.minutes)
                .await?;
            if let Some(movement) = first_fired_outcome(&market, &windows, trigger) {
                return Ok(Some(vec![movement]));
            }
        }

        Ok(Some(Vec::new()))
    }
}

/// Volume, days-to-resolution and blocklist filters.
fn is_eligible(market: &Market, config: &DetectionConfig, now: DateTime<Utc>) -> bool {
    if market.volume_24h < config.min_volume_usd {
        return false;
    }
    if let Some(days) = market.days_to_resolution(now) {
        if days < config.min_days_to_resolution {
            return false;
        }
    }
    !is_market_blocked(
        &market.question,
        &market.category,
        &config.blocklist_categories,
        &config.blocklist_keywords,
    )
    .is_blocked()
}

/// YES then NO; the first outcome whose window crosses `trigger` wins.
fn first_fired_outcome(
    market: &Market,
    windows: &HashMap<String, PriceWindow>,
    trigger: &Trigger,
) -> Option<PriceMovement> {
    market.outcome_tokens().find_map(|(side, token_id)| {
        check_price_window(
            market,
            token_id,
            side,
            windows.get(token_id),
            trigger.cents,
            trigger.minutes,
        )
    })
}

/// Build a movement if `price_window` moved at least `threshold_cents` in either direction.
///
/// The change is signed absolute cents, `(latest - oldest) * 100`, since prices are
/// already 0..1 probabilities. Returns None when the window is missing or incomplete.
pub fn check_price_window(
    market: &Market,
    token_id: &str,
    side: Side,
    price_window: Option<&PriceWindow>,
    threshold_cents: f64,
    window_minutes: u32,
) -> Option<PriceMovement> {
    let window = price_window?;
    let (oldest, latest) = (window.oldest?, window.latest?);

    let change_cents = (latest - oldest) * 100.0;
    if change_cents.abs() + CENTS_EPSILON < threshold_cents {
        return None;
    }

    debug!(
        market_id = %market.id,
        %side,
        change_cents,
        window_minutes,
        threshold = threshold_cents,
        "Movement detected"
    );

    Some(PriceMovement {
        market_id: market.id.clone(),
        market: market.clone(),
        token_id: token_id.to_string(),
        side,
        price_before: oldest,
        price_after: latest,
        change_cents,
        window_minutes,
        detected_at: Utc::now(),
    })
}

/// Alert label: `UP_{minutes}m` for a non-negative change, else `DOWN_{minutes}m`.
pub fn format_trigger_type(change_cents: f64, window_minutes: u32) -> String {
    let direction = if change_cents >= 0.0 { "UP" } else { "DOWN" };
    format!("{direction}_{window_minutes}m")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_detection_config;
    use crate::error::AppError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    struct FakeConfig {
        cfg: Option<DetectionConfig>,
    }

    #[async_trait]
    impl ConfigProvider for FakeConfig {
        async fn get_config(&self) -> Result<DetectionConfig> {
            self.cfg
                .clone()
                .ok_or_else(|| AppError::Config("unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeMarkets {
        markets: Vec<Market>,
        reads: AtomicUsize,
    }

    impl MarketSource for FakeMarkets {
        fn cached_markets(&self) -> Vec<Market> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.markets.clone()
        }

        fn market_by_id(&self, market_id: &str) -> Option<Market> {
            self.markets.iter().find(|m| m.id == market_id).cloned()
        }
    }

    /// Windows keyed by lookback minutes, then token id.
    #[derive(Default)]
    struct FakePrices {
        by_minutes: HashMap<u32, HashMap<String, PriceWindow>>,
        fail: bool,
        calls: Mutex<Vec<(usize, u32)>>,
    }

    impl FakePrices {
        fn with(mut self, minutes: u32, token: &str, oldest: f64, latest: f64) -> Self {
            self.by_minutes.entry(minutes).or_default().insert(
                token.to_string(),
                PriceWindow {
                    oldest: Some(oldest),
                    latest: Some(latest),
                    oldest_at: None,
                },
            );
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PriceWindowSource for FakePrices {
        async fn price_windows_batch(
            &self,
            token_ids: &[String],
            minutes: u32,
        ) -> Result<HashMap<String, PriceWindow>> {
            self.calls.lock().unwrap().push((token_ids.len(), minutes));
            if self.fail {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            let all = self.by_minutes.get(&minutes).cloned().unwrap_or_default();
            Ok(all
                .into_iter()
                .filter(|(token, _)| token_ids.contains(token))
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeCooldown {
        cooling: HashSet<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CooldownSource for FakeCooldown {
        async fn markets_in_cooldown(
            &self,
            market_ids: &[String],
            _minutes: u32,
        ) -> Result<HashSet<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(market_ids
                .iter()
                .filter(|id| self.cooling.contains(*id))
                .cloned()
                .collect())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn now() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            condition_id: format!("cond-{id}"),
            question: format!("Will {id} happen?"),
            slug: id.to_string(),
            event_slug: String::new(),
            category: "Politics".to_string(),
            end_date: Some(now() + Duration::days(30)),
            active: true,
            volume_24h: 100_000.0,
            yes_token_id: format!("{id}-yes"),
            no_token_id: format!("{id}-no"),
        }
    }

    /// The reference config: 50k min volume, 60m cooldown, one 5¢/30m trigger.
    fn base_config() -> DetectionConfig {
        default_detection_config()
    }

    struct Harness {
        markets: Arc<FakeMarkets>,
        prices: Arc<FakePrices>,
        cooldown: Arc<FakeCooldown>,
        detector: MovementDetector,
    }

    fn harness(
        cfg: Option<DetectionConfig>,
        markets: Vec<Market>,
        prices: FakePrices,
        cooling: &[&str],
    ) -> Harness {
        let markets = Arc::new(FakeMarkets {
            markets,
            ..Default::default()
        });
        let prices = Arc::new(prices);
        let cooldown = Arc::new(FakeCooldown {
            cooling: cooling.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let detector = MovementDetector::new(
            Arc::new(FakeConfig { cfg }),
            markets.clone(),
            prices.clone(),
            cooldown.clone(),
        );
        Harness {
            markets,
            prices,
            cooldown,
            detector,
        }
    }

    // -----------------------------------------------------------------------
    // detect_movements
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn seven_cent_yes_move_fires() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-yes", 0.50, 0.57),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        let m = &movements[0];
        assert_eq!(m.market_id, "m1");
        assert_eq!(m.side, Side::Yes);
        assert_eq!(m.token_id, "m1-yes");
        assert!((m.change_cents - 7.0).abs() < 1e-9);
        assert_eq!(m.window_minutes, 30);
        assert_eq!(m.price_before, 0.50);
        assert_eq!(m.price_after, 0.57);
    }

    #[tokio::test]
    async fn three_cent_move_is_below_threshold() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-yes", 0.50, 0.53),
            &[],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_threshold_fires() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-no", 0.53, 0.48),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].side, Side::No);
        assert!(movements[0].change_cents < 0.0);
    }

    #[tokio::test]
    async fn paused_returns_empty_without_touching_collaborators() {
        let mut cfg = base_config();
        cfg.alerts_paused = true;
        let h = harness(
            Some(cfg),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-yes", 0.10, 0.90),
            &[],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
        assert_eq!(h.markets.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.cooldown.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.prices.call_count(), 0);
    }

    #[tokio::test]
    async fn low_volume_market_never_reaches_cooldown_or_prices() {
        let mut thin = market("thin");
        thin.volume_24h = 49_999.0;
        let h = harness(
            Some(base_config()),
            vec![thin],
            FakePrices::default().with(30, "thin-yes", 0.10, 0.90),
            &[],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
        assert_eq!(h.cooldown.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.prices.call_count(), 0);
    }

    #[tokio::test]
    async fn market_resolving_too_soon_is_skipped() {
        let mut soon = market("soon");
        soon.end_date = Some(now() + Duration::hours(20));
        let mut undated = market("undated");
        undated.end_date = None;
        let h = harness(
            Some(base_config()),
            vec![soon, undated],
            FakePrices::default()
                .with(30, "soon-yes", 0.10, 0.90)
                .with(30, "undated-yes", 0.10, 0.90),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].market_id, "undated");
    }

    #[tokio::test]
    async fn blocked_category_is_excluded_even_on_large_move() {
        let mut cfg = base_config();
        cfg.blocklist_categories = vec!["politics".to_string()];
        let h = harness(
            Some(cfg),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-yes", 0.40, 0.60),
            &[],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_keyword_is_excluded() {
        let mut cfg = base_config();
        cfg.blocklist_keywords = vec!["M1 HAPPEN".to_string()];
        let h = harness(
            Some(cfg),
            vec![market("m1"), market("m2")],
            FakePrices::default()
                .with(30, "m1-yes", 0.40, 0.60)
                .with(30, "m2-yes", 0.40, 0.60),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].market_id, "m2");
    }

    #[tokio::test]
    async fn market_in_cooldown_is_never_evaluated() {
        let h = harness(
            Some(base_config()),
            vec![market("hot"), market("cold")],
            FakePrices::default()
                .with(30, "hot-yes", 0.20, 0.80)
                .with(30, "cold-yes", 0.20, 0.80),
            &["hot"],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].market_id, "cold");
        // Only the non-cooling market's tokens are queried.
        assert_eq!(h.prices.calls.lock().unwrap()[0], (2, 30));
    }

    #[tokio::test]
    async fn all_markets_cooling_skips_price_queries() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default().with(30, "m1-yes", 0.20, 0.80),
            &["m1"],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
        assert_eq!(h.prices.call_count(), 0);
    }

    #[tokio::test]
    async fn one_movement_per_market_with_yes_preferred() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default()
                .with(30, "m1-yes", 0.40, 0.50)
                .with(30, "m1-no", 0.60, 0.50),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].side, Side::Yes);
    }

    #[tokio::test]
    async fn first_trigger_in_list_order_wins() {
        let mut cfg = base_config();
        cfg.triggers = vec![
            Trigger { cents: 10.0, minutes: 60 },
            Trigger { cents: 5.0, minutes: 15 },
        ];
        let h = harness(
            Some(cfg),
            vec![market("a"), market("b")],
            FakePrices::default()
                // a fires on both triggers; b only on the second.
                .with(60, "a-yes", 0.30, 0.45)
                .with(15, "a-yes", 0.40, 0.46)
                .with(60, "b-yes", 0.50, 0.52)
                .with(15, "b-no", 0.50, 0.44),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].market_id, "a");
        assert_eq!(movements[0].window_minutes, 60);
        assert_eq!(movements[1].market_id, "b");
        assert_eq!(movements[1].window_minutes, 15);
        assert_eq!(movements[1].side, Side::No);
        // One batched query per trigger, covering every token.
        let calls = h.prices.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(4, 60), (4, 15)]);
    }

    #[tokio::test]
    async fn unchanged_price_never_fires() {
        let h = harness(
            Some(base_config()),
            vec![market("m1")],
            FakePrices::default()
                .with(30, "m1-yes", 0.42, 0.42)
                .with(30, "m1-no", 0.58, 0.58),
            &[],
        );
        assert!(h.detector.detect_movements_at(now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tokens_are_not_queried() {
        let mut m = market("m1");
        m.yes_token_id.clear();
        let h = harness(
            Some(base_config()),
            vec![m],
            FakePrices::default().with(30, "m1-no", 0.30, 0.40),
            &[],
        );
        let movements = h.detector.detect_movements_at(now()).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].side, Side::No);
        assert_eq!(h.prices.calls.lock().unwrap()[0], (1, 30));
    }

    #[tokio::test]
    async fn price_source_failure_aborts_the_pass() {
        let prices = FakePrices {
            fail: true,
            ..Default::default()
        };
        let h = harness(Some(base_config()), vec![market("m1")], prices, &[]);
        let result = h.detector.detect_movements_at(now()).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn config_failure_aborts_the_pass() {
        let h = harness(None, vec![market("m1")], FakePrices::default(), &[]);
        assert!(matches!(
            h.detector.detect_movements_at(now()).await,
            Err(AppError::Config(_))
        ));
        assert_eq!(h.markets.reads.load(Ordering::SeqCst), 0);
    }

    // -----------------------------------------------------------------------
    // check_market
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn check_market_stops_at_first_trigger() {
        let mut cfg = base_config();
        cfg.triggers = vec![
            Trigger { cents: 5.0, minutes: 15 },
            Trigger { cents: 5.0, minutes: 60 },
        ];
        let h = harness(
            Some(cfg),
            vec![market("m1")],
            FakePrices::default()
                .with(15, "m1-no", 0.50, 0.40)
                .with(60, "m1-yes", 0.20, 0.60),
            &[],
        );
        let movements = h.detector.check_market("m1").await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].window_minutes, 15);
        assert_eq!(movements[0].side, Side::No);
        assert_eq!(h.prices.call_count(), 1);
    }

    #[tokio::test]
    async fn check_market_ignores_cooldown_and_volume() {
        let mut m = market("m1");
        m.volume_24h = 10.0;
        let h = harness(
            Some(base_config()),
            vec![m],
            FakePrices::default().with(30, "m1-yes", 0.50, 0.60),
            &["m1"],
        );
        assert_eq!(h.detector.check_market("m1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_market_unknown_id_is_empty() {
        let h = harness(Some(base_config()), vec![], FakePrices::default(), &[]);
        assert!(h.detector.check_market("nope").await.unwrap().is_empty());
        assert_eq!(h.prices.call_count(), 0);
    }

    #[tokio::test]
    async fn check_cached_market_tells_unknown_from_quiet() {
        let h = harness(Some(base_config()), vec![market("m1")], FakePrices::default(), &[]);
        assert_eq!(h.detector.check_cached_market("nope").await.unwrap(), None);
        assert_eq!(h.detector.check_cached_market("m1").await.unwrap(), Some(Vec::new()));
        assert_eq!(h.prices.call_count(), 1);
    }

    // -----------------------------------------------------------------------
    // check_price_window / format_trigger_type
    // -----------------------------------------------------------------------

    #[test]
    fn incomplete_window_yields_nothing() {
        let m = market("m1");
        assert!(check_price_window(&m, "t", Side::Yes, None, 1.0, 30).is_none());
        let partial = PriceWindow {
            oldest: Some(0.2),
            latest: None,
            oldest_at: None,
        };
        assert!(check_price_window(&m, "t", Side::Yes, Some(&partial), 1.0, 30).is_none());
    }

    #[test]
    fn change_sign_follows_direction() {
        let m = market("m1");
        let up = PriceWindow {
            oldest: Some(0.40),
            latest: Some(0.55),
            oldest_at: None,
        };
        let mv = check_price_window(&m, "t", Side::Yes, Some(&up), 5.0, 30).unwrap();
        assert!((mv.change_cents - 15.0).abs() < 1e-9);
        assert_eq!(format_trigger_type(mv.change_cents, mv.window_minutes), "UP_30m");

        let down = PriceWindow {
            oldest: Some(0.55),
            latest: Some(0.40),
            oldest_at: None,
        };
        let mv = check_price_window(&m, "t", Side::No, Some(&down), 5.0, 10).unwrap();
        assert!((mv.change_cents + 15.0).abs() < 1e-9);
        assert_eq!(format_trigger_type(mv.change_cents, 10), "DOWN_10m");
    }

    #[test]
    fn zero_change_labels_up() {
        assert_eq!(format_trigger_type(0.0, 5), "UP_5m");
    }
}
