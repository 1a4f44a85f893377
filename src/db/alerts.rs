use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::PRICE_QUERY_CHUNK_SIZE;
use crate::db::models::AlertRow;
use crate::detector::format_trigger_type;
use crate::error::Result;
use crate::types::PriceMovement;

/// Sent-alert history. Doubles as the cooldown source: a market with an alert
/// inside the cooldown window is skipped by the detector.
#[derive(Clone)]
pub struct AlertStore {
    pool: sqlx::SqlitePool,
}

impl AlertStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_alert(&self, movement: &PriceMovement) -> Result<i64> {
        let trigger_type = format_trigger_type(movement.change_cents, movement.window_minutes);
        let side = movement.side.to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (
                market_id, token_id, side, trigger_type,
                price_before, price_after, change_cents, window_minutes, sent_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&movement.market_id)
        .bind(&movement.token_id)
        .bind(side)
        .bind(trigger_type)
        .bind(movement.price_before)
        .bind(movement.price_after)
        .bind(movement.change_cents)
        .bind(i64::from(movement.window_minutes))
        .bind(movement.detected_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Market ids among `market_ids` that alerted within the last `minutes`.
    pub async fn markets_in_cooldown(
        &self,
        market_ids: &[String],
        minutes: u32,
    ) -> Result<HashSet<String>> {
        let since = Utc::now() - Duration::minutes(i64::from(minutes));
        self.markets_alerted_since(market_ids, since).await
    }

    pub async fn markets_alerted_since(
        &self,
        market_ids: &[String],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let mut cooling = HashSet::new();
        if market_ids.is_empty() {
            return Ok(cooling);
        }
        let since_ms = since.timestamp_millis();

        for chunk in market_ids.chunks(PRICE_QUERY_CHUNK_SIZE) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT DISTINCT market_id FROM alerts WHERE sent_at >= ",
            );
            qb.push_bind(since_ms);
            qb.push(" AND market_id IN (");
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(id.as_str());
            }
            ids.push_unseparated(")");

            let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.pool).await?;
            cooling.extend(rows.into_iter().map(|(id,)| id));
        }

        Ok(cooling)
    }

    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<AlertRow>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, market_id, token_id, side, trigger_type,
                   price_before, price_after, change_cents, window_minutes, sent_at
            FROM alerts
            ORDER BY sent_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
