//! Cluster-wide usage report
//!
//! The report is persisted as JSON. Every field is defaulted and unknown
//! fields are ignored, so readers and writers of different versions can
//! share the same object; [`crate::migrate`] fills in whatever an older
//! writer left out.

use crate::entry::TargetReplicationStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replication counters for one bucket and one target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BucketTargetUsageInfo {
    pub replication_pending_size: u64,
    pub replication_failed_size: u64,
    pub replicated_size: u64,
    pub replica_size: u64,
    pub replication_pending_count: u64,
    pub replication_failed_count: u64,
    pub replicated_count: u64,
}

impl BucketTargetUsageInfo {
    /// Add `other` into these counters, saturating at `u64::MAX`
    pub fn merge(&mut self, other: &Self) {
        self.replication_pending_size = self
            .replication_pending_size
            .saturating_add(other.replication_pending_size);
        self.replication_failed_size = self
            .replication_failed_size
            .saturating_add(other.replication_failed_size);
        self.replicated_size = self.replicated_size.saturating_add(other.replicated_size);
        self.replica_size = self.replica_size.saturating_add(other.replica_size);
        self.replication_pending_count = self
            .replication_pending_count
            .saturating_add(other.replication_pending_count);
        self.replication_failed_count = self
            .replication_failed_count
            .saturating_add(other.replication_failed_count);
        self.replicated_count = self.replicated_count.saturating_add(other.replicated_count);
    }
}

impl From<&TargetReplicationStats> for BucketTargetUsageInfo {
    fn from(stats: &TargetReplicationStats) -> Self {
        Self {
            replication_pending_size: stats.pending_size,
            replication_failed_size: stats.failed_size,
            replicated_size: stats.replicated_size,
            replica_size: 0,
            replication_pending_count: stats.pending_count,
            replication_failed_count: stats.failed_count,
            replicated_count: stats.replicated_count,
        }
    }
}

/// Usage of one bucket
///
/// The `*_v1` fields are the single-target replication counters written
/// before per-target accounting existed. They are kept as read so old
/// reports stay byte-compatible; the load path mirrors them into
/// `replication_info`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BucketUsageInfo {
    pub size: u64,
    #[serde(rename = "objectsPendingReplicationTotalSize")]
    pub replication_pending_size_v1: u64,
    #[serde(rename = "objectsFailedReplicationTotalSize")]
    pub replication_failed_size_v1: u64,
    #[serde(rename = "objectsReplicatedTotalSize")]
    pub replicated_size_v1: u64,
    #[serde(rename = "objectsPendingReplicationCount")]
    pub replication_pending_count_v1: u64,
    #[serde(rename = "objectsFailedReplicationCount")]
    pub replication_failed_count_v1: u64,
    #[serde(rename = "objectReplicaTotalSize")]
    pub replica_size: u64,
    pub objects_count: u64,
    #[serde(rename = "objectsSizesHistogram")]
    pub objects_size_histogram: BTreeMap<String, u64>,
    pub versions_count: u64,
    #[serde(rename = "objectsReplicationInfo")]
    pub replication_info: BTreeMap<String, BucketTargetUsageInfo>,
}

impl BucketUsageInfo {
    /// Bucket usage carrying only a size
    #[must_use]
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// True when any legacy single-target replication counter is set
    #[must_use]
    pub const fn has_legacy_replication(&self) -> bool {
        self.replicated_size_v1 > 0
            || self.replication_pending_size_v1 > 0
            || self.replication_failed_size_v1 > 0
            || self.replication_pending_count_v1 > 0
            || self.replication_failed_count_v1 > 0
    }

    /// Legacy counters in the per-target shape
    #[must_use]
    pub const fn legacy_target_usage(&self) -> BucketTargetUsageInfo {
        BucketTargetUsageInfo {
            replication_pending_size: self.replication_pending_size_v1,
            replication_failed_size: self.replication_failed_size_v1,
            replicated_size: self.replicated_size_v1,
            replica_size: 0,
            replication_pending_count: self.replication_pending_count_v1,
            replication_failed_count: self.replication_failed_count_v1,
            replicated_count: 0,
        }
    }
}

/// Merged usage of the whole cluster
///
/// `buckets_usage` and `bucket_sizes` are two generations of the same
/// per-bucket data; after a load both are populated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterUsageReport {
    /// When the report was produced (unix millis)
    pub last_update: u64,
    #[serde(rename = "objectsCount")]
    pub objects_total_count: u64,
    #[serde(rename = "versionsCount")]
    pub versions_total_count: u64,
    #[serde(rename = "objectsTotalSize")]
    pub objects_total_size: u64,
    /// Replication counters keyed by target ARN
    #[serde(rename = "objectsReplicationInfo")]
    pub replication_info: BTreeMap<String, BucketTargetUsageInfo>,
    pub buckets_count: u64,
    #[serde(rename = "bucketsUsageInfo")]
    pub buckets_usage: BTreeMap<String, BucketUsageInfo>,
    /// Legacy per-bucket sizes
    #[serde(rename = "bucketsSizes")]
    pub bucket_sizes: BTreeMap<String, u64>,
}

impl ClusterUsageReport {
    /// Build a report from per-bucket usage, deriving every total
    #[must_use]
    pub fn from_buckets(last_update: u64, buckets: BTreeMap<String, BucketUsageInfo>) -> Self {
        let mut report = Self {
            last_update,
            buckets_count: buckets.len() as u64,
            ..Self::default()
        };
        for (name, usage) in &buckets {
            report.objects_total_count = report
                .objects_total_count
                .saturating_add(usage.objects_count);
            report.versions_total_count = report
                .versions_total_count
                .saturating_add(usage.versions_count);
            report.objects_total_size = report.objects_total_size.saturating_add(usage.size);
            report.bucket_sizes.insert(name.clone(), usage.size);
            for (arn, target) in &usage.replication_info {
                report
                    .replication_info
                    .entry(arn.clone())
                    .or_default()
                    .merge(target);
            }
        }
        report.buckets_usage = buckets;
        report
    }

    /// True for the zero-valued report returned when nothing is persisted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Usage of one bucket
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<&BucketUsageInfo> {
        self.buckets_usage.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_buckets_derives_totals() {
        let mut photos = BucketUsageInfo::with_size(300);
        photos.objects_count = 3;
        photos.versions_count = 4;
        photos.replication_info.insert(
            "arn:a".into(),
            BucketTargetUsageInfo {
                replicated_size: 100,
                ..Default::default()
            },
        );
        let mut logs = BucketUsageInfo::with_size(50);
        logs.objects_count = 1;
        logs.versions_count = 1;
        logs.replication_info.insert(
            "arn:a".into(),
            BucketTargetUsageInfo {
                replicated_size: 20,
                ..Default::default()
            },
        );

        let report = ClusterUsageReport::from_buckets(
            1_700_000_000_000,
            BTreeMap::from([("photos".to_string(), photos), ("logs".to_string(), logs)]),
        );
        assert_eq!(report.buckets_count, 2);
        assert_eq!(report.objects_total_size, 350);
        assert_eq!(report.objects_total_count, 4);
        assert_eq!(report.versions_total_count, 5);
        assert_eq!(report.bucket_sizes["logs"], 50);
        assert_eq!(report.replication_info["arn:a"].replicated_size, 120);
        assert_eq!(report.bucket("photos").map(|b| b.size), Some(300));
    }

    #[test]
    fn test_from_buckets_saturates_totals() {
        let mut big = BucketUsageInfo::with_size(u64::MAX);
        big.objects_count = u64::MAX;
        big.replication_info.insert(
            "arn:x".into(),
            BucketTargetUsageInfo {
                replicated_size: u64::MAX,
                replicated_count: 1,
                ..Default::default()
            },
        );
        let mut small = BucketUsageInfo::with_size(5);
        small.objects_count = 2;
        small.replication_info.insert(
            "arn:x".into(),
            BucketTargetUsageInfo {
                replicated_size: 7,
                replicated_count: 1,
                ..Default::default()
            },
        );

        let report = ClusterUsageReport::from_buckets(
            1,
            BTreeMap::from([("big".to_string(), big), ("small".to_string(), small)]),
        );
        assert_eq!(report.objects_total_size, u64::MAX);
        assert_eq!(report.objects_total_count, u64::MAX);
        assert_eq!(report.replication_info["arn:x"].replicated_size, u64::MAX);
        assert_eq!(report.replication_info["arn:x"].replicated_count, 2);
    }

    #[test]
    fn test_json_field_names() {
        let report = ClusterUsageReport::from_buckets(
            7,
            BTreeMap::from([("b1".to_string(), BucketUsageInfo::with_size(9))]),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lastUpdate"], 7);
        assert_eq!(json["objectsTotalSize"], 9);
        assert_eq!(json["bucketsSizes"]["b1"], 9);
        assert_eq!(json["bucketsUsageInfo"]["b1"]["size"], 9);
    }

    #[test]
    fn test_decode_tolerates_missing_and_unknown_fields() {
        let report: ClusterUsageReport = serde_json::from_str(
            r#"{"bucketsSizes":{"old":42},"someFutureField":{"x":1}}"#,
        )
        .unwrap();
        assert_eq!(report.bucket_sizes["old"], 42);
        assert!(report.buckets_usage.is_empty());
        assert_eq!(report.last_update, 0);
    }

    #[test]
    fn test_legacy_replication_detection() {
        let mut usage = BucketUsageInfo::with_size(10);
        assert!(!usage.has_legacy_replication());
        usage.replication_pending_size_v1 = 1;
        assert!(usage.has_legacy_replication());
        assert_eq!(usage.legacy_target_usage().replication_pending_size, 1);
    }

    #[test]
    fn test_default_report_is_empty() {
        assert!(ClusterUsageReport::default().is_empty());
        let report = ClusterUsageReport {
            buckets_count: 1,
            ..Default::default()
        };
        assert!(!report.is_empty());
    }
}
