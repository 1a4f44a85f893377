//! Collaborators the movement detector reads from. Each is injected, so the
//! detector can be exercised against in-memory fakes.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::db::{AlertStore, ConfigStore, PriceStore};
use crate::error::Result;
use crate::state::MarketStore;
use crate::types::{DetectionConfig, Market, PriceWindow};

#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_config(&self) -> Result<DetectionConfig>;
}

/// Read access to the current market snapshot.
pub trait MarketSource: Send + Sync {
    fn cached_markets(&self) -> Vec<Market>;
    fn market_by_id(&self, market_id: &str) -> Option<Market>;
}

#[async_trait]
pub trait PriceWindowSource: Send + Sync {
    /// Oldest/latest price per token over the last `minutes`, for all tokens in one call.
    async fn price_windows_batch(
        &self,
        token_ids: &[String],
        minutes: u32,
    ) -> Result<HashMap<String, PriceWindow>>;
}

#[async_trait]
pub trait CooldownSource: Send + Sync {
    /// Subset of `market_ids` that alerted within the last `minutes`.
    async fn markets_in_cooldown(
        &self,
        market_ids: &[String],
        minutes: u32,
    ) -> Result<HashSet<String>>;
}

#[async_trait]
impl ConfigProvider for ConfigStore {
    async fn get_config(&self) -> Result<DetectionConfig> {
        ConfigStore::get_config(self).await
    }
}

impl MarketSource for MarketStore {
    fn cached_markets(&self) -> Vec<Market> {
        self.all_markets()
    }

    fn market_by_id(&self, market_id: &str) -> Option<Market> {
        self.get_market(market_id)
    }
}

#[async_trait]
impl PriceWindowSource for PriceStore {
    async fn price_windows_batch(
        &self,
        token_ids: &[String],
        minutes: u32,
    ) -> Result<HashMap<String, PriceWindow>> {
        PriceStore::price_windows_batch(self, token_ids, minutes).await
    }
}

#[async_trait]
impl CooldownSource for AlertStore {
    async fn markets_in_cooldown(
        &self,
        market_ids: &[String],
        minutes: u32,
    ) -> Result<HashSet<String>> {
        AlertStore::markets_in_cooldown(self, market_ids, minutes).await
    }
}
