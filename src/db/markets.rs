use chrono::Utc;

use crate::db::models::MarketRow;
use crate::error::Result;
use crate::types::Market;

/// Upsert the latest metadata for every synced market.
pub async fn upsert_markets(pool: &sqlx::SqlitePool, markets: &[Market]) -> Result<()> {
    let updated_at = Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;

    for market in markets {
        sqlx::query(
            r#"
            INSERT INTO markets (
                id, condition_id, question, category, end_date, volume_24h,
                yes_token_id, no_token_id, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                condition_id = excluded.condition_id,
                question = excluded.question,
                category = excluded.category,
                end_date = excluded.end_date,
                volume_24h = excluded.volume_24h,
                yes_token_id = excluded.yes_token_id,
                no_token_id = excluded.no_token_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&market.id)
        .bind(&market.condition_id)
        .bind(&market.question)
        .bind(&market.category)
        .bind(market.end_date.map(|d| d.timestamp_millis()))
        .bind(market.volume_24h)
        .bind(&market.yes_token_id)
        .bind(&market.no_token_id)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Markets the sync has stored, most recently updated first. Includes markets that
/// have since dropped out of the active cache.
pub async fn seen_markets(pool: &sqlx::SqlitePool, limit: i64) -> Result<Vec<MarketRow>> {
    let rows = sqlx::query_as::<_, MarketRow>(
        r#"
        SELECT id, condition_id, question, category, end_date, volume_24h,
               yes_token_id, no_token_id, updated_at
        FROM markets
        ORDER BY updated_at DESC, id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
