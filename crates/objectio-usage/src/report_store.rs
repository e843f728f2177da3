//! Persistence of the cluster usage report
//!
//! The report is one JSON object at `<bucket_meta_prefix>/<report_name>` in
//! the metadata bucket. Each store overwrites it entirely; each load applies
//! [`crate::migrate::MIGRATIONS`] before handing the report out.

use crate::backend::{ObjectStore, guarded};
use crate::error::{UsageError, UsageResult};
use crate::metrics::{UsageMetrics, usage_metrics};
use crate::migrate;
use crate::replication::ReplicationConfigSource;
use crate::report::ClusterUsageReport;
use bytes::Bytes;
use objectio_common::UsageConfig;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reads and writes the cluster usage report
pub struct ReportStore {
    store: Arc<dyn ObjectStore>,
    replication: Arc<dyn ReplicationConfigSource>,
    config: UsageConfig,
}

impl ReportStore {
    /// Create a report store writing through `store`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        replication: Arc<dyn ReplicationConfigSource>,
        config: UsageConfig,
    ) -> Self {
        Self {
            store,
            replication,
            config,
        }
    }

    /// Usage configuration in effect
    #[must_use]
    pub const fn config(&self) -> &UsageConfig {
        &self.config
    }

    /// Persist `report`, replacing the previous one
    ///
    /// A missing metadata bucket is not an error: the report is dropped and
    /// the next store is expected to succeed once the bucket exists.
    pub async fn store(
        &self,
        report: &ClusterUsageReport,
        cancel: &CancellationToken,
    ) -> UsageResult<()> {
        let metrics = usage_metrics();
        let data = serde_json::to_vec(report).map_err(|e| {
            UsageMetrics::inc(&metrics.report_store_failures);
            UsageError::ReportEncode(e)
        })?;
        let key = self.config.report_key();

        let written = guarded(
            "usage report write",
            cancel,
            self.config.report_io_timeout(),
            self.store
                .put_object(&self.config.meta_bucket, &key, Bytes::from(data)),
        )
        .await;

        match written {
            Ok(()) => {
                UsageMetrics::inc(&metrics.report_stores);
                debug!("Stored usage report at {}/{}", self.config.meta_bucket, key);
                Ok(())
            }
            Err(UsageError::Backend(e)) if e.is_bucket_not_found() => {
                UsageMetrics::inc(&metrics.report_stores_swallowed);
                warn!(
                    "Metadata bucket {} does not exist yet, usage report not stored",
                    self.config.meta_bucket
                );
                Ok(())
            }
            Err(e) => {
                UsageMetrics::inc(&metrics.report_store_failures);
                Err(e)
            }
        }
    }

    /// Load the persisted report, migrated to the current schema
    ///
    /// Returns the zero-valued report when nothing has been stored yet.
    pub async fn load(&self, cancel: &CancellationToken) -> UsageResult<ClusterUsageReport> {
        let metrics = usage_metrics();
        let result = self.load_inner(cancel).await;
        match &result {
            Ok(_) => UsageMetrics::inc(&metrics.report_loads),
            Err(_) => UsageMetrics::inc(&metrics.report_load_failures),
        }
        result
    }

    async fn load_inner(&self, cancel: &CancellationToken) -> UsageResult<ClusterUsageReport> {
        let key = self.config.report_key();
        let read = guarded(
            "usage report read",
            cancel,
            self.config.report_io_timeout(),
            self.store.get_object(&self.config.meta_bucket, &key),
        )
        .await;

        let data = match read {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("No usage report at {}/{}", self.config.meta_bucket, key);
                return Ok(ClusterUsageReport::default());
            }
            Err(e) => return Err(e),
        };

        let mut report: ClusterUsageReport =
            serde_json::from_slice(&data).map_err(UsageError::ReportDecode)?;
        let applied = migrate::apply_all(
            &mut report,
            self.replication.as_ref(),
            cancel,
            self.config.report_io_timeout(),
        )
        .await?;
        if !applied.is_empty() {
            usage_metrics()
                .report_migrations
                .fetch_add(applied.len() as u64, Ordering::Relaxed);
        }
        Ok(report)
    }
}
