//! Inference latency counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct InferenceStats {
    latency_sum_us: AtomicU64,
    count: AtomicU64,
}

/// Point-in-time view for the info endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub inference_count: u64,
    pub avg_latency_ms: f32,
}

impl InferenceStats {
    pub fn record(&self, elapsed: Duration) {
        self.latency_sum_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.count.load(Ordering::Relaxed);
        let avg = if count > 0 { (sum as f32 / count as f32) / 1000.0 } else { 0.0 };

        StatsSnapshot {
            inference_count: count,
            avg_latency_ms: avg,
        }
    }
}
