//! Lightweight in-memory counters describing what the monitor itself did.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct MonitorMetrics {
    observed: AtomicU64,
    emitted: AtomicU64,
    violations: AtomicU64,
    skipped: AtomicU64,
    elapsed_max_ms: AtomicU64,
}

static MONITOR_METRICS: OnceLock<MonitorMetrics> = OnceLock::new();

fn metrics() -> &'static MonitorMetrics {
    MONITOR_METRICS.get_or_init(MonitorMetrics::default)
}

/// An operation reached the monitor
pub fn record_observed(elapsed_ms: f64) {
    let elapsed_ms = elapsed_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.observed.fetch_add(1, Ordering::Relaxed);

    let mut current = metrics.elapsed_max_ms.load(Ordering::Relaxed);
    while elapsed_ms > current {
        match metrics.elapsed_max_ms.compare_exchange(
            current,
            elapsed_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

/// A slow-operation record was forwarded to the sink
pub fn record_emitted() {
    metrics().emitted.fetch_add(1, Ordering::Relaxed);
}

/// A scope exceeded its query ceiling
pub fn record_violation() {
    metrics().violations.fetch_add(1, Ordering::Relaxed);
}

/// Monitoring was skipped because its configuration was unavailable
pub fn record_skipped() {
    metrics().skipped.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct MonitorMetricsSnapshot {
    pub observed: u64,
    pub emitted: u64,
    pub violations: u64,
    pub skipped: u64,
    pub max_elapsed_ms: Option<u64>,
}

pub fn snapshot() -> MonitorMetricsSnapshot {
    let metrics = metrics();
    let max_ms = metrics.elapsed_max_ms.load(Ordering::Relaxed);

    MonitorMetricsSnapshot {
        observed: metrics.observed.load(Ordering::Relaxed),
        emitted: metrics.emitted.load(Ordering::Relaxed),
        violations: metrics.violations.load(Ordering::Relaxed),
        skipped: metrics.skipped.load(Ordering::Relaxed),
        max_elapsed_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}
