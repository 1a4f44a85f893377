use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::PRICE_QUERY_CHUNK_SIZE;
use crate::db::models::PriceSnapshotRow;
use crate::error::Result;
use crate::types::PriceWindow;

/// One observed outcome price, ready to persist.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    pub token_id: String,
    pub market_id: String,
    pub price: f64,
}

/// Price history backing the batch window queries.
#[derive(Clone)]
pub struct PriceStore {
    pool: sqlx::SqlitePool,
}

impl PriceStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a batch of snapshots stamped with `at`, in one transaction.
    pub async fn record_snapshots(
        &self,
        snapshots: &[PriceSnapshot],
        at: DateTime<Utc>,
    ) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        let recorded_at = at.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for chunk in snapshots.chunks(PRICE_QUERY_CHUNK_SIZE) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "INSERT INTO price_snapshots (token_id, market_id, price, recorded_at) ",
            );
            qb.push_values(chunk, |mut row, s| {
                row.push_bind(s.token_id.as_str())
                    .push_bind(s.market_id.as_str())
                    .push_bind(s.price)
                    .push_bind(recorded_at);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(snapshots.len())
    }

    /// Oldest and latest price per token over the last `minutes`.
    /// Tokens with no snapshots in the window are absent from the map.
    pub async fn price_windows_batch(
        &self,
        token_ids: &[String],
        minutes: u32,
    ) -> Result<HashMap<String, PriceWindow>> {
        let since = Utc::now() - Duration::minutes(i64::from(minutes));
        self.price_windows_since(token_ids, since).await
    }

    pub async fn price_windows_since(
        &self,
        token_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, PriceWindow>> {
        let mut windows: HashMap<String, PriceWindow> = HashMap::new();
        if token_ids.is_empty() {
            return Ok(windows);
        }
        let since_ms = since.timestamp_millis();

        for chunk in token_ids.chunks(PRICE_QUERY_CHUNK_SIZE) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT token_id, price, recorded_at FROM price_snapshots WHERE recorded_at >= ",
            );
            qb.push_bind(since_ms);
            qb.push(" AND token_id IN (");
            let mut ids = qb.separated(", ");
            for token_id in chunk {
                ids.push_bind(token_id.as_str());
            }
            ids.push_unseparated(")");
            qb.push(" ORDER BY token_id, recorded_at ASC, id ASC");

            let rows = qb
                .build_query_as::<PriceSnapshotRow>()
                .fetch_all(&self.pool)
                .await?;

            // Rows are ordered by time within each token: first seen is oldest, last is latest.
            for row in rows {
                let window = windows.entry(row.token_id).or_default();
                if window.oldest.is_none() {
                    window.oldest = Some(row.price);
                    window.oldest_at = DateTime::from_timestamp_millis(row.recorded_at);
                }
                window.latest = Some(row.price);
            }
        }

        debug!(
            tokens = token_ids.len(),
            with_data = windows.len(),
            "Price windows fetched"
        );
        Ok(windows)
    }

    /// Delete snapshots recorded before `cutoff`. Returns rows removed.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM price_snapshots WHERE recorded_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
