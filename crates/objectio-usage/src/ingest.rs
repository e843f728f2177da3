//! Sequential ingestion of cluster usage reports
//!
//! The scan scheduler pushes freshly merged reports through a bounded
//! queue; one consumer task stores them one at a time, so writes of the
//! report object are ordered and never overlap. Dropping every
//! [`ReportSender`] closes the queue and the consumer exits after draining.

use crate::error::{UsageError, UsageResult};
use crate::metrics::{UsageMetrics, usage_metrics};
use crate::report::ClusterUsageReport;
use crate::report_store::ReportStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// What the consumer did before exiting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Reports taken off the queue
    pub received: u64,
    /// Reports handed to the store successfully
    pub stored: u64,
    /// Reports the store failed to persist
    pub failed: u64,
}

/// Producer side of the ingestion queue
#[derive(Clone, Debug)]
pub struct ReportSender {
    tx: mpsc::Sender<ClusterUsageReport>,
}

impl ReportSender {
    /// Queue a report, waiting while the queue is full
    pub async fn send(&self, report: ClusterUsageReport) -> UsageResult<()> {
        self.tx
            .send(report)
            .await
            .map_err(|_| UsageError::PipelineClosed)
    }
}

/// Consumer committing queued reports to a [`ReportStore`]
pub struct IngestionPipeline {
    store: Arc<ReportStore>,
    cancel: CancellationToken,
}

impl IngestionPipeline {
    /// Create a pipeline; cancelling `cancel` stops the consumer early
    pub fn new(store: Arc<ReportStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Start the consumer with a queue of `depth` reports (at least one)
    pub fn spawn(self, depth: usize) -> (ReportSender, JoinHandle<IngestStats>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let handle = tokio::spawn(self.run(rx));
        (ReportSender { tx }, handle)
    }

    /// Store every report received on `rx` until it closes or the pipeline is cancelled
    pub async fn run(self, mut rx: mpsc::Receiver<ClusterUsageReport>) -> IngestStats {
        info!("Usage report ingestion started");
        let metrics = usage_metrics();
        let mut stats = IngestStats::default();

        loop {
            let report = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("Usage report ingestion cancelled");
                    break;
                }
                report = rx.recv() => match report {
                    Some(report) => report,
                    None => break,
                },
            };

            stats.received += 1;
            UsageMetrics::inc(&metrics.reports_ingested);
            match self.store.store(&report, &self.cancel).await {
                Ok(()) => stats.stored += 1,
                Err(UsageError::Cancelled) => {
                    stats.failed += 1;
                    info!("Usage report ingestion cancelled during store");
                    break;
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        "Failed to store usage report (last update {}): {}",
                        report.last_update, e
                    );
                }
            }
        }

        info!(
            "Usage report ingestion stopped: {} received, {} stored, {} failed",
            stats.received, stats.stored, stats.failed
        );
        stats
    }
}
