//! Cross-shard prefix usage aggregation
//!
//! Every shard holds a disjoint part of a bucket's objects and persists its
//! own usage tree for that bucket. Summing the per-prefix sizes of all
//! shards gives the bucket's usage per prefix.
//!
//! ```text
//!            load_prefix_usage("bucket")
//!                       │
//!      ┌────────────────┼────────────────┐
//!      ▼                ▼                ▼
//!  pool-0/shard-0   pool-0/shard-1   pool-1/shard-0     read snapshots (parallel)
//!      │                │                │
//!   find+flatten     find+flatten     not found
//!      └────────────────┴───────┬────────┘
//!                               ▼
//!                  sum sizes per prefix (after all reads)
//! ```
//!
//! A shard whose snapshot fails to load is skipped and the rest still sum:
//! a partial prefix total is more useful than none. Skipped shards are
//! reported in [`PrefixUsage::skipped`].

use crate::backend::ObjectLayer;
use crate::error::{UsageError, UsageResult};
use crate::metrics::{UsageMetrics, usage_metrics};
use crate::path::bucket_relative_prefix;
use crate::tree::UsageTree;
use futures::stream::{self, StreamExt};
use objectio_common::{BucketName, ShardLocation, UsageConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A shard left out of an aggregation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedShard {
    pub location: ShardLocation,
    pub reason: String,
}

/// Prefix usage of one bucket plus how it was obtained
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefixUsage {
    /// Total bytes per bucket-relative prefix
    pub prefixes: HashMap<String, u64>,
    /// Shards in the topology
    pub shards_total: usize,
    /// Shards whose snapshot was loaded
    pub shards_loaded: usize,
    /// Shards with no snapshot for the bucket
    pub shards_missing: usize,
    /// Shards whose snapshot could not be loaded
    pub skipped: Vec<SkippedShard>,
}

impl PrefixUsage {
    /// True when some shard's usage is absent from the totals because it failed to load
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Sums per-shard usage trees into per-prefix bucket usage
pub struct CrossShardAggregator {
    layer: Arc<dyn ObjectLayer>,
    config: UsageConfig,
}

impl CrossShardAggregator {
    /// Create an aggregator over an object layer
    pub fn new(layer: Arc<dyn ObjectLayer>, config: UsageConfig) -> Self {
        Self { layer, config }
    }

    /// Usage per prefix of `bucket`, e.g. `{"photos/": 355601334}`
    ///
    /// Empty when the object layer is not sharded.
    pub async fn load_prefix_usage(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> UsageResult<HashMap<String, u64>> {
        let usage = self.load_prefix_usage_detailed(bucket, cancel).await?;
        if usage.is_degraded() {
            warn!(
                "Prefix usage for {} is missing {}/{} shards",
                bucket,
                usage.skipped.len(),
                usage.shards_total
            );
        }
        Ok(usage.prefixes)
    }

    /// Usage per prefix of `bucket` with per-shard bookkeeping
    ///
    /// Returns either the totals over every shard that could be read or
    /// [`UsageError::Cancelled`]; never totals of an interrupted run.
    pub async fn load_prefix_usage_detailed(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> UsageResult<PrefixUsage> {
        let Some(topology) = self.layer.shard_topology() else {
            debug!("Object layer is not sharded, no prefix usage for {}", bucket);
            return Ok(PrefixUsage::default());
        };
        BucketName::new(bucket).map_err(objectio_common::Error::from)?;

        let metrics = usage_metrics();
        let shards = topology.shards();
        let path = self.config.snapshot_path(bucket);
        let config = &self.config;

        let reads = stream::iter(shards)
            .map(|(location, shard)| {
                let path = path.as_str();
                async move {
                    let outcome = UsageTree::load(shard.as_ref(), config, path, cancel).await;
                    (location, outcome)
                }
            })
            .buffer_unordered(config.max_concurrent_shard_reads.max(1))
            .collect::<Vec<_>>();

        let outcomes = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            outcomes = reads => Some(outcomes),
        };
        let Some(outcomes) = outcomes.filter(|_| !cancel.is_cancelled()) else {
            UsageMetrics::inc(&metrics.prefix_queries_cancelled);
            return Err(UsageError::Cancelled);
        };

        let mut usage = PrefixUsage {
            shards_total: outcomes.len(),
            ..PrefixUsage::default()
        };
        for (location, outcome) in outcomes {
            match outcome {
                Ok(Some(tree)) => {
                    usage.shards_loaded += 1;
                    UsageMetrics::inc(&metrics.snapshots_loaded);
                    merge_tree(&mut usage.prefixes, &tree, bucket);
                }
                Ok(None) => {
                    usage.shards_missing += 1;
                    UsageMetrics::inc(&metrics.snapshots_missing);
                }
                Err(UsageError::Cancelled) => {
                    UsageMetrics::inc(&metrics.prefix_queries_cancelled);
                    return Err(UsageError::Cancelled);
                }
                Err(e) => {
                    warn!("Skipping usage of {} on {}: {}", bucket, location, e);
                    UsageMetrics::inc(&metrics.snapshots_skipped);
                    usage.skipped.push(SkippedShard {
                        location,
                        reason: e.to_string(),
                    });
                }
            }
        }
        usage.skipped.sort_by_key(|s| s.location);

        UsageMetrics::inc(&metrics.prefix_queries);
        debug!(
            "Prefix usage for {}: {} prefixes from {}/{} shards",
            bucket,
            usage.prefixes.len(),
            usage.shards_loaded,
            usage.shards_total
        );
        Ok(usage)
    }
}

/// Add one shard's per-prefix sizes for `bucket` into `totals`
///
/// Ids are decoded here, so distinct ids naming the same prefix are summed.
fn merge_tree(totals: &mut HashMap<String, u64>, tree: &UsageTree, bucket: &str) {
    let Some(root) = tree.find(bucket) else {
        return;
    };
    for (id, entry) in tree.flatten_children(root) {
        let total = totals.entry(bucket_relative_prefix(bucket, &id)).or_insert(0);
        *total = total.saturating_add(entry.size);
    }
}
