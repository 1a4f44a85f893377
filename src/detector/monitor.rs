use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::detector::MovementDetector;
use crate::error::Result;
use crate::types::PriceMovement;

/// Runs detection passes on a fixed interval and forwards movements downstream.
///
/// Passes are serialized: the next tick waits for the current pass to finish.
/// A failed pass is logged and retried on the next tick.
pub struct MovementMonitor {
    detector: Arc<MovementDetector>,
    movement_tx: mpsc::Sender<PriceMovement>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    interval_secs: u64,
}

impl MovementMonitor {
    pub fn new(
        detector: Arc<MovementDetector>,
        movement_tx: mpsc::Sender<PriceMovement>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        interval_secs: u64,
    ) -> Self {
        Self {
            detector,
            movement_tx,
            health,
            latency,
            interval_secs,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume immediate first tick, give the refresher a head start

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                self.health.record_failed_pass();
                error!("Detection pass failed: {e}");
            }
        }
    }

    /// One pass. Returns the number of movements forwarded.
    pub async fn run_once(&self) -> Result<usize> {
        let started = Instant::now();
        let movements = self.detector.detect_movements().await?;
        self.latency.record(started.elapsed());
        self.health
            .record_pass(Utc::now().timestamp_millis().max(0) as u64, movements.len() as u64);

        let count = movements.len();
        for movement in movements {
            if let Err(e) = self.movement_tx.send(movement).await {
                warn!("Movement channel closed: {e}");
                break;
            }
        }
        Ok(count)
    }
}
