use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::types::Market;

// ---------------------------------------------------------------------------
// MarketSnapshot
// ---------------------------------------------------------------------------

/// One immutable generation of the cache. Readers hold an `Arc` to it, so a
/// refresh never changes the markets seen by a detection pass already running.
#[derive(Debug, Default)]
struct MarketSnapshot {
    /// Markets in feed order.
    markets: Vec<Market>,
    /// market_id → index into `markets`
    by_id: HashMap<String, usize>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl MarketSnapshot {
    fn build(markets: Vec<Market>, refreshed_at: DateTime<Utc>) -> Self {
        let mut deduped = Vec::with_capacity(markets.len());
        let mut by_id = HashMap::with_capacity(markets.len());
        for market in markets {
            // First occurrence wins; Gamma can list a market under more than one event.
            if by_id.contains_key(&market.id) {
                continue;
            }
            by_id.insert(market.id.clone(), deduped.len());
            deduped.push(market);
        }
        Self {
            markets: deduped,
            by_id,
            refreshed_at: Some(refreshed_at),
        }
    }
}

// ---------------------------------------------------------------------------
// MarketStore
// ---------------------------------------------------------------------------

/// In-process cache of currently active markets, replaced wholesale on each sync.
pub struct MarketStore {
    current: RwLock<Arc<MarketSnapshot>>,
}

impl MarketStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Swap in a fresh set of markets. Duplicate ids keep their first occurrence.
    pub fn replace_all(&self, markets: Vec<Market>) {
        let snapshot = Arc::new(MarketSnapshot::build(markets, Utc::now()));
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }

    fn snapshot(&self) -> Arc<MarketSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn all_markets(&self) -> Vec<Market> {
        self.snapshot().markets.clone()
    }

    pub fn get_market(&self, market_id: &str) -> Option<Market> {
        let snapshot = self.snapshot();
        let idx = *snapshot.by_id.get(market_id)?;
        snapshot.markets.get(idx).cloned()
    }

    pub fn market_count(&self) -> usize {
        self.snapshot().markets.len()
    }

    /// When the current snapshot was installed. None before the first sync.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().refreshed_at
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(MarketSnapshot::default())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
