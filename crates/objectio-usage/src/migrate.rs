//! Load-time migrations of the cluster usage report
//!
//! Every load applies [`MIGRATIONS`] in order. Each step only fills in data
//! that is missing, so applying a step to an already-migrated report
//! changes nothing.

use crate::backend::guarded;
use crate::error::{UsageError, UsageResult};
use crate::replication::ReplicationConfigSource;
use crate::report::{BucketTargetUsageInfo, BucketUsageInfo, ClusterUsageReport};
use objectio_common::Error;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One report migration step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Migration {
    /// Derive per-bucket usage from legacy per-bucket sizes
    BackfillBucketsUsage,
    /// Derive legacy per-bucket sizes from per-bucket usage
    BackfillBucketSizes,
    /// Mirror legacy single-target replication counters into per-target maps
    LegacyReplicationTargets,
}

/// Migration steps, in the order they are applied
pub const MIGRATIONS: [Migration; 3] = [
    Migration::BackfillBucketsUsage,
    Migration::BackfillBucketSizes,
    Migration::LegacyReplicationTargets,
];

impl Migration {
    /// Step name for logs and metrics
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BackfillBucketsUsage => "backfill_buckets_usage",
            Self::BackfillBucketSizes => "backfill_bucket_sizes",
            Self::LegacyReplicationTargets => "legacy_replication_targets",
        }
    }

    /// Apply this step; returns whether the report changed
    ///
    /// Each replication config lookup runs under `cancel` and `deadline`.
    pub async fn apply(
        self,
        report: &mut ClusterUsageReport,
        replication: &dyn ReplicationConfigSource,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> UsageResult<bool> {
        match self {
            Self::BackfillBucketsUsage => Ok(backfill_buckets_usage(report)),
            Self::BackfillBucketSizes => Ok(backfill_bucket_sizes(report)),
            Self::LegacyReplicationTargets => {
                migrate_legacy_replication(report, replication, cancel, deadline).await
            }
        }
    }
}

/// Apply every step in order; returns the steps that changed the report
pub async fn apply_all(
    report: &mut ClusterUsageReport,
    replication: &dyn ReplicationConfigSource,
    cancel: &CancellationToken,
    deadline: Duration,
) -> UsageResult<Vec<Migration>> {
    let mut applied = Vec::new();
    for step in MIGRATIONS {
        if step.apply(report, replication, cancel, deadline).await? {
            debug!("Applied usage report migration {}", step.name());
            applied.push(step);
        }
    }
    Ok(applied)
}

fn backfill_buckets_usage(report: &mut ClusterUsageReport) -> bool {
    if !report.buckets_usage.is_empty() || report.bucket_sizes.is_empty() {
        return false;
    }
    report.buckets_usage = report
        .bucket_sizes
        .iter()
        .map(|(bucket, &size)| (bucket.clone(), BucketUsageInfo::with_size(size)))
        .collect();
    true
}

fn backfill_bucket_sizes(report: &mut ClusterUsageReport) -> bool {
    if !report.bucket_sizes.is_empty() || report.buckets_usage.is_empty() {
        return false;
    }
    report.bucket_sizes = report
        .buckets_usage
        .iter()
        .map(|(bucket, usage)| (bucket.clone(), usage.size))
        .collect();
    true
}

/// Look up every legacy bucket's target first so a lookup that does not
/// succeed leaves the report untouched.
async fn migrate_legacy_replication(
    report: &mut ClusterUsageReport,
    replication: &dyn ReplicationConfigSource,
    cancel: &CancellationToken,
    deadline: Duration,
) -> UsageResult<bool> {
    let legacy: Vec<(String, BucketTargetUsageInfo)> = report
        .buckets_usage
        .iter()
        .filter(|(_, usage)| usage.has_legacy_replication())
        .map(|(bucket, usage)| (bucket.clone(), usage.legacy_target_usage()))
        .collect();
    if legacy.is_empty() {
        return Ok(false);
    }

    let mut resolved = Vec::with_capacity(legacy.len());
    for (bucket, target) in legacy {
        let lookup = guarded(
            "replication config lookup",
            cancel,
            deadline,
            replication.get_replication_config(&bucket),
        )
        .await;
        let arn = match lookup {
            Ok(config) if !config.role_arn.is_empty() => config.role_arn,
            Ok(_) => {
                let source = Error::configuration("replication config has no target ARN");
                return Err(UsageError::ReplicationLookup { bucket, source });
            }
            Err(UsageError::Backend(source)) => {
                return Err(UsageError::ReplicationLookup { bucket, source });
            }
            Err(e) => return Err(e),
        };
        resolved.push((bucket, arn, target));
    }

    let mut changed = false;
    let mut per_arn: BTreeMap<String, BucketTargetUsageInfo> = BTreeMap::new();
    for (bucket, arn, target) in resolved {
        per_arn.entry(arn.clone()).or_default().merge(&target);
        if let Some(usage) = report.buckets_usage.get_mut(&bucket) {
            if let Entry::Vacant(slot) = usage.replication_info.entry(arn) {
                slot.insert(target);
                changed = true;
            }
        }
    }
    for (arn, total) in per_arn {
        if let Entry::Vacant(slot) = report.replication_info.entry(arn) {
            slot.insert(total);
            changed = true;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{ReplicationConfig, StaticReplicationConfigs};
    use async_trait::async_trait;

    const DEADLINE: Duration = Duration::from_secs(5);

    async fn migrate(
        report: &mut ClusterUsageReport,
        source: &dyn ReplicationConfigSource,
    ) -> UsageResult<Vec<Migration>> {
        apply_all(report, source, &CancellationToken::new(), DEADLINE).await
    }

    fn legacy_bucket(size: u64, replicated: u64, pending_count: u64) -> BucketUsageInfo {
        BucketUsageInfo {
            size,
            replicated_size_v1: replicated,
            replication_pending_count_v1: pending_count,
            replication_failed_size_v1: 1,
            ..Default::default()
        }
    }

    fn configs(entries: &[(&str, &str)]) -> StaticReplicationConfigs {
        let source = StaticReplicationConfigs::new();
        for (bucket, arn) in entries {
            source.set(
                *bucket,
                ReplicationConfig {
                    role_arn: (*arn).to_string(),
                    destination_bucket: String::new(),
                },
            );
        }
        source
    }

    #[tokio::test]
    async fn test_forward_backfill_from_legacy_sizes() {
        let mut report = ClusterUsageReport {
            bucket_sizes: BTreeMap::from([("a".to_string(), 10), ("b".to_string(), 20)]),
            ..Default::default()
        };
        let applied = migrate(&mut report, &configs(&[])).await.unwrap();
        assert_eq!(applied, vec![Migration::BackfillBucketsUsage]);
        assert_eq!(report.buckets_usage.len(), 2);
        assert_eq!(report.buckets_usage["a"], BucketUsageInfo::with_size(10));
        assert_eq!(report.buckets_usage["b"].size, 20);
    }

    #[tokio::test]
    async fn test_backward_backfill_from_usage() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("a".to_string(), BucketUsageInfo::with_size(7))]),
            ..Default::default()
        };
        let applied = migrate(&mut report, &configs(&[])).await.unwrap();
        assert_eq!(applied, vec![Migration::BackfillBucketSizes]);
        assert_eq!(report.bucket_sizes, BTreeMap::from([("a".to_string(), 7)]));
    }

    #[tokio::test]
    async fn test_both_populated_left_alone() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("a".to_string(), BucketUsageInfo::with_size(7))]),
            bucket_sizes: BTreeMap::from([("a".to_string(), 99)]),
            ..Default::default()
        };
        let before = report.clone();
        assert!(migrate(&mut report, &configs(&[])).await.unwrap().is_empty());
        assert_eq!(report, before);
    }

    #[tokio::test]
    async fn test_legacy_replication_materialized() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([
                ("photos".to_string(), legacy_bucket(100, 40, 2)),
                ("plain".to_string(), BucketUsageInfo::with_size(5)),
            ]),
            ..Default::default()
        };
        let source = configs(&[("photos", "arn:photos-dr")]);
        let applied = migrate(&mut report, &source).await.unwrap();
        assert!(applied.contains(&Migration::LegacyReplicationTargets));

        let expected = BucketTargetUsageInfo {
            replicated_size: 40,
            replication_pending_count: 2,
            replication_failed_size: 1,
            ..Default::default()
        };
        assert_eq!(report.replication_info.len(), 1);
        assert_eq!(report.replication_info["arn:photos-dr"], expected);
        assert_eq!(
            report.buckets_usage["photos"].replication_info["arn:photos-dr"],
            expected
        );
        // Legacy fields untouched
        assert_eq!(report.buckets_usage["photos"].replicated_size_v1, 40);
        assert!(report.buckets_usage["plain"].replication_info.is_empty());
    }

    #[tokio::test]
    async fn test_shared_target_is_summed_once() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([
                ("a".to_string(), legacy_bucket(1, 10, 0)),
                ("b".to_string(), legacy_bucket(1, 5, 0)),
            ]),
            ..Default::default()
        };
        let source = configs(&[("a", "arn:shared"), ("b", "arn:shared")]);
        migrate(&mut report, &source).await.unwrap();
        assert_eq!(report.replication_info["arn:shared"].replicated_size, 15);
        assert_eq!(report.replication_info["arn:shared"].replication_failed_size, 2);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let mut report = ClusterUsageReport {
            bucket_sizes: BTreeMap::from([("photos".to_string(), 100)]),
            buckets_usage: BTreeMap::from([("photos".to_string(), legacy_bucket(100, 40, 2))]),
            ..Default::default()
        };
        let source = configs(&[("photos", "arn:photos-dr")]);
        migrate(&mut report, &source).await.unwrap();
        let once = report.clone();

        let applied = migrate(&mut report, &source).await.unwrap();
        assert!(applied.is_empty());
        assert_eq!(report, once);
    }

    #[tokio::test]
    async fn test_existing_target_entry_wins() {
        let mut bucket = legacy_bucket(100, 40, 2);
        let current = BucketTargetUsageInfo {
            replicated_size: 1000,
            ..Default::default()
        };
        bucket.replication_info.insert("arn:photos-dr".into(), current);
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("photos".to_string(), bucket)]),
            replication_info: BTreeMap::from([("arn:photos-dr".to_string(), current)]),
            ..Default::default()
        };
        let source = configs(&[("photos", "arn:photos-dr")]);
        let changed = Migration::LegacyReplicationTargets
            .apply(&mut report, &source, &CancellationToken::new(), DEADLINE)
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(report.replication_info["arn:photos-dr"].replicated_size, 1000);
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts_without_partial_changes() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([
                ("a".to_string(), legacy_bucket(1, 10, 0)),
                ("b".to_string(), legacy_bucket(1, 5, 0)),
            ]),
            ..Default::default()
        };
        let before = report.clone();
        // "b" has no replication config
        let source = configs(&[("a", "arn:a")]);
        let err = Migration::LegacyReplicationTargets
            .apply(&mut report, &source, &CancellationToken::new(), DEADLINE)
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::ReplicationLookup { ref bucket, .. } if bucket == "b"));
        assert_eq!(report, before);
    }

    #[tokio::test]
    async fn test_empty_arn_is_a_lookup_failure() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("a".to_string(), legacy_bucket(1, 10, 0))]),
            ..Default::default()
        };
        let source = configs(&[("a", "")]);
        let err = migrate(&mut report, &source).await.unwrap_err();
        assert!(matches!(err, UsageError::ReplicationLookup { .. }));
    }

    #[tokio::test]
    async fn test_shared_target_saturates() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([
                ("a".to_string(), legacy_bucket(1, u64::MAX, 0)),
                ("b".to_string(), legacy_bucket(1, u64::MAX, 0)),
            ]),
            ..Default::default()
        };
        let source = configs(&[("a", "arn:x"), ("b", "arn:x")]);
        migrate(&mut report, &source).await.unwrap();
        assert_eq!(report.replication_info["arn:x"].replicated_size, u64::MAX);
        assert_eq!(report.replication_info["arn:x"].replication_failed_size, 2);
        assert_eq!(
            report.buckets_usage["a"].replication_info["arn:x"].replicated_size,
            u64::MAX
        );
    }

    /// Source whose lookups never finish on their own
    struct StalledSource;

    #[async_trait]
    impl ReplicationConfigSource for StalledSource {
        async fn get_replication_config(
            &self,
            _bucket: &str,
        ) -> objectio_common::Result<ReplicationConfig> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ReplicationConfig::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_honors_deadline() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("a".to_string(), legacy_bucket(1, 10, 0))]),
            ..Default::default()
        };
        let before = report.clone();
        let err = Migration::LegacyReplicationTargets
            .apply(
                &mut report,
                &StalledSource,
                &CancellationToken::new(),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UsageError::Timeout {
                operation: "replication config lookup"
            }
        ));
        assert_eq!(report, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_honors_cancellation() {
        let mut report = ClusterUsageReport {
            buckets_usage: BTreeMap::from([("a".to_string(), legacy_bucket(1, 10, 0))]),
            ..Default::default()
        };
        let before = report.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = Migration::LegacyReplicationTargets
            .apply(&mut report, &StalledSource, &cancel, DEADLINE)
            .await
            .unwrap_err();
        assert!(matches!(err, UsageError::Cancelled));
        assert_eq!(report, before);
    }
}
