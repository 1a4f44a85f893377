//! Shared health state for the /health endpoint.
//! Updated by MarketRefresher, MovementMonitor, and AlertWriter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared health metrics. Updated by detector components, read by API.
#[derive(Default)]
pub struct HealthState {
    /// Millisecond timestamp of the last successful Gamma sync (0 = none).
    pub last_refresh_at_ms: AtomicU64,
    /// Millisecond timestamp of the last completed detection pass (0 = none).
    pub last_detection_at_ms: AtomicU64,
    /// Movements found by the last completed pass.
    pub last_pass_movements: AtomicU64,
    /// True when the most recent pass aborted on a collaborator error.
    pub last_pass_failed: AtomicBool,
    /// Approximate count of movements queued for DB write.
    pub write_queue_pending: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_refresh_at_ms(&self, ms: u64) {
        self.last_refresh_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn record_pass(&self, at_ms: u64, movements: u64) {
        self.last_detection_at_ms.store(at_ms, Ordering::Relaxed);
        self.last_pass_movements.store(movements, Ordering::Relaxed);
        self.last_pass_failed.store(false, Ordering::Relaxed);
    }

    pub fn record_failed_pass(&self) {
        self.last_pass_failed.store(true, Ordering::Relaxed);
    }

    pub fn inc_write_queue_pending(&self) {
        self.write_queue_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_write_queue_pending(&self) {
        let _ = self
            .write_queue_pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }

    pub fn last_refresh_at_ms(&self) -> u64 {
        self.last_refresh_at_ms.load(Ordering::Relaxed)
    }

    pub fn last_detection_at_ms(&self) -> u64 {
        self.last_detection_at_ms.load(Ordering::Relaxed)
    }

    pub fn last_pass_movements(&self) -> u64 {
        self.last_pass_movements.load(Ordering::Relaxed)
    }

    pub fn last_pass_failed(&self) -> bool {
        self.last_pass_failed.load(Ordering::Relaxed)
    }

    pub fn write_queue_pending(&self) -> u64 {
        self.write_queue_pending.load(Ordering::Relaxed)
    }
}
