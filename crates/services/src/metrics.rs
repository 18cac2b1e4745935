use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub requests: u64,
    pub cache_hits: u64,
    pub builds_started: u64,
    pub builds_succeeded: u64,
    pub builds_failed: u64,
    pub stale_rebuilds: u64,
    pub unreadable_rebuilds: u64,
    pub store_writes: u64,
    pub storage_retries: u64,
    pub avg_build_ms: f64,
}

impl MetricsSnapshot {
    pub fn hit_rate_percent(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64 * 100.0
        }
    }
}

/// Lock-free counters for the build coordinator.
#[derive(Debug)]
pub struct BuildMetrics {
    start_time: Instant,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    builds_started: AtomicU64,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    stale_rebuilds: AtomicU64,
    unreadable_rebuilds: AtomicU64,
    store_writes: AtomicU64,
    storage_retries: AtomicU64,
    build_time_us: AtomicU64,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            builds_started: AtomicU64::new(0),
            builds_succeeded: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            stale_rebuilds: AtomicU64::new(0),
            unreadable_rebuilds: AtomicU64::new(0),
            store_writes: AtomicU64::new(0),
            storage_retries: AtomicU64::new(0),
            build_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_started(&self) {
        self.builds_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_succeeded(&self, elapsed: std::time::Duration) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
        self.build_time_us
            .fetch_add(elapsed.as_micros().min(u128::from(u64::MAX)) as u64, Ordering::Relaxed);
    }

    pub fn record_build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_rebuild(&self) {
        self.stale_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unreadable_rebuild(&self) {
        self.unreadable_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_write(&self) {
        self.store_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_retry(&self) {
        self.storage_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.builds_succeeded.load(Ordering::Relaxed);
        let build_us = self.build_time_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            builds_started: self.builds_started.load(Ordering::Relaxed),
            builds_succeeded: succeeded,
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            stale_rebuilds: self.stale_rebuilds.load(Ordering::Relaxed),
            unreadable_rebuilds: self.unreadable_rebuilds.load(Ordering::Relaxed),
            store_writes: self.store_writes.load(Ordering::Relaxed),
            storage_retries: self.storage_retries.load(Ordering::Relaxed),
            avg_build_ms: if succeeded > 0 {
                build_us as f64 / succeeded as f64 / 1000.0
            } else {
                0.0
            },
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!("📈 Build Summary:");
        info!("   Requests: {}", s.requests);
        info!("   Cache hits: {} ({:.1}%)", s.cache_hits, s.hit_rate_percent());
        info!("   Builds: {} started, {} succeeded, {} failed", s.builds_started, s.builds_succeeded, s.builds_failed);
        info!("   Rebuilds: {} stale, {} unreadable", s.stale_rebuilds, s.unreadable_rebuilds);
        info!("   Store writes: {}, storage retries: {}", s.store_writes, s.storage_retries);
        info!("   Average build time: {:.2}ms", s.avg_build_ms);
        info!("   Uptime: {} seconds", s.uptime_seconds);
    }
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self::new()
    }
}
