use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::api::health::HealthState;
use crate::db::AlertStore;
use crate::types::PriceMovement;

/// Receives movements from the alert consumer and persists them as alert rows.
/// Runs as a dedicated background task so the detection loop never waits on disk.
pub struct AlertWriter {
    alerts: AlertStore,
    movement_rx: mpsc::Receiver<PriceMovement>,
    health: Arc<HealthState>,
}

impl AlertWriter {
    pub fn new(
        alerts: AlertStore,
        movement_rx: mpsc::Receiver<PriceMovement>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            alerts,
            movement_rx,
            health,
        }
    }

    pub async fn run(mut self) {
        while let Some(movement) = self.movement_rx.recv().await {
            if let Err(e) = self.alerts.record_alert(&movement).await {
                error!(market_id = %movement.market_id, "Alert write error: {e}");
            }
            self.health.dec_write_queue_pending();
        }
    }
}
