use chrono::Utc;
use tracing::info;

use crate::db::models::DetectionConfigRow;
use crate::error::{AppError, Result};
use crate::types::{DetectionConfig, Trigger};

/// Persistent home of the single `DetectionConfig` row.
#[derive(Clone)]
pub struct ConfigStore {
    pool: sqlx::SqlitePool,
}

impl ConfigStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Write `defaults` only if no config row exists yet. Returns true if it seeded.
    pub async fn seed_if_missing(&self, defaults: &DetectionConfig) -> Result<bool> {
        let result = self.write(defaults, "INSERT OR IGNORE").await?;
        let seeded = result > 0;
        if seeded {
            info!("Seeded default detection config");
        }
        Ok(seeded)
    }

    /// Read the current config. A missing row is an error: the pass cannot run without it.
    pub async fn get_config(&self) -> Result<DetectionConfig> {
        let row = sqlx::query_as::<_, DetectionConfigRow>(
            r#"
            SELECT min_volume_usd, min_days_to_resolution, cooldown_minutes, alerts_paused,
                   triggers, blocklist_categories, blocklist_keywords
            FROM detection_config
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Config("detection config row is missing".to_string()))?;

        row_to_config(row)
    }

    /// Validate and replace the stored config.
    pub async fn update_config(&self, cfg: &DetectionConfig) -> Result<()> {
        cfg.validate()?;
        self.write(cfg, "INSERT OR REPLACE").await?;
        info!(
            triggers = cfg.triggers.len(),
            paused = cfg.alerts_paused,
            cooldown_minutes = cfg.cooldown_minutes,
            "Detection config updated"
        );
        Ok(())
    }

    async fn write(&self, cfg: &DetectionConfig, verb: &str) -> Result<u64> {
        let triggers = serde_json::to_string(&cfg.triggers)?;
        let categories = serde_json::to_string(&cfg.blocklist_categories)?;
        let keywords = serde_json::to_string(&cfg.blocklist_keywords)?;
        let sql = format!(
            r#"
            {verb} INTO detection_config (
                id, min_volume_usd, min_days_to_resolution, cooldown_minutes, alerts_paused,
                triggers, blocklist_categories, blocklist_keywords, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );

        let result = sqlx::query(&sql)
            .bind(cfg.min_volume_usd)
            .bind(cfg.min_days_to_resolution)
            .bind(i64::from(cfg.cooldown_minutes))
            .bind(cfg.alerts_paused)
            .bind(triggers)
            .bind(categories)
            .bind(keywords)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_config(row: DetectionConfigRow) -> Result<DetectionConfig> {
    let triggers: Vec<Trigger> = serde_json::from_str(&row.triggers)?;
    let blocklist_categories: Vec<String> = serde_json::from_str(&row.blocklist_categories)?;
    let blocklist_keywords: Vec<String> = serde_json::from_str(&row.blocklist_keywords)?;
    let cooldown_minutes = u32::try_from(row.cooldown_minutes)
        .map_err(|_| AppError::Config(format!("bad cooldown_minutes: {}", row.cooldown_minutes)))?;

    Ok(DetectionConfig {
        min_volume_usd: row.min_volume_usd,
        min_days_to_resolution: row.min_days_to_resolution,
        cooldown_minutes,
        alerts_paused: row.alerts_paused,
        triggers,
        blocklist_categories,
        blocklist_keywords,
    })
}
