//! Process-wide counters for the dispatch core.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_dispatched: AtomicU64,
    results_received: AtomicU64,
    results_dropped: AtomicU64,
    packages_registered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn result_received(&self) {
        self.results_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Late/duplicate result no handler recognized.
    pub fn result_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "results_dropped", "Metric incremented");
    }

    pub fn package_registered(&self) {
        self.packages_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            results_received: self.results_received.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            packages_registered: self.packages_registered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_dispatched: u64,
    pub results_received: u64,
    pub results_dropped: u64,
    pub packages_registered: u64,
}
