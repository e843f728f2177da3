//! Usage accounting metrics for Prometheus

use std::fmt::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the usage subsystem
#[derive(Debug, Default)]
pub struct UsageMetrics {
    /// Shard snapshots loaded and merged
    pub snapshots_loaded: AtomicU64,
    /// Shards with no snapshot for the queried bucket
    pub snapshots_missing: AtomicU64,
    /// Shards skipped because their snapshot failed to load
    pub snapshots_skipped: AtomicU64,
    /// Prefix usage queries answered
    pub prefix_queries: AtomicU64,
    /// Prefix usage queries cancelled by the caller
    pub prefix_queries_cancelled: AtomicU64,
    /// Reports written
    pub report_stores: AtomicU64,
    /// Report writes dropped because the metadata bucket is missing
    pub report_stores_swallowed: AtomicU64,
    /// Report writes that failed
    pub report_store_failures: AtomicU64,
    /// Reports loaded
    pub report_loads: AtomicU64,
    /// Report loads that failed
    pub report_load_failures: AtomicU64,
    /// Migration steps that changed a loaded report
    pub report_migrations: AtomicU64,
    /// Reports received by the ingestion pipeline
    pub reports_ingested: AtomicU64,
}

impl UsageMetrics {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(2 * 1024);
        let counters: [(&str, &str, &AtomicU64); 12] = [
            (
                "objectio_usage_snapshots_loaded_total",
                "Shard usage snapshots loaded",
                &self.snapshots_loaded,
            ),
            (
                "objectio_usage_snapshots_missing_total",
                "Shards without a usage snapshot for the queried bucket",
                &self.snapshots_missing,
            ),
            (
                "objectio_usage_snapshots_skipped_total",
                "Shards skipped because their usage snapshot failed to load",
                &self.snapshots_skipped,
            ),
            (
                "objectio_usage_prefix_queries_total",
                "Prefix usage queries answered",
                &self.prefix_queries,
            ),
            (
                "objectio_usage_prefix_queries_cancelled_total",
                "Prefix usage queries cancelled",
                &self.prefix_queries_cancelled,
            ),
            (
                "objectio_usage_report_stores_total",
                "Usage reports written",
                &self.report_stores,
            ),
            (
                "objectio_usage_report_stores_swallowed_total",
                "Usage report writes dropped because the metadata bucket is missing",
                &self.report_stores_swallowed,
            ),
            (
                "objectio_usage_report_store_failures_total",
                "Usage report writes that failed",
                &self.report_store_failures,
            ),
            (
                "objectio_usage_report_loads_total",
                "Usage reports loaded",
                &self.report_loads,
            ),
            (
                "objectio_usage_report_load_failures_total",
                "Usage report loads that failed",
                &self.report_load_failures,
            ),
            (
                "objectio_usage_report_migrations_total",
                "Migration steps applied to loaded usage reports",
                &self.report_migrations,
            ),
            (
                "objectio_usage_reports_ingested_total",
                "Usage reports received by the ingestion pipeline",
                &self.reports_ingested,
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {}", value.load(Ordering::Relaxed));
        }
        output
    }
}

/// Global usage metrics instance
static USAGE_METRICS: OnceLock<UsageMetrics> = OnceLock::new();

/// Get the global usage metrics instance
pub fn usage_metrics() -> &'static UsageMetrics {
    USAGE_METRICS.get_or_init(UsageMetrics::new)
}
