//! ObjectIO Usage - Usage accounting
//!
//! This crate implements usage accounting for ObjectIO including:
//! - Per-shard usage trees and their persisted snapshots
//! - Cross-shard prefix usage aggregation
//! - The cluster usage report, its store and load-time migrations
//! - Sequential ingestion of freshly merged reports
//! - In-memory and local-disk storage collaborators

pub mod aggregate;
pub mod backend;
pub mod entry;
pub mod error;
pub mod ingest;
pub mod local;
pub mod memory;
pub mod metrics;
pub mod migrate;
pub mod path;
pub mod replication;
pub mod report;
pub mod report_store;
pub mod snapshot;
pub mod tree;

// Re-exports
pub use aggregate::{CrossShardAggregator, PrefixUsage, SkippedShard};
pub use backend::{ObjectLayer, ObjectStore, ShardPool, ShardTopology};
pub use entry::{OBJECT_SIZE_INTERVALS, SizeHistogram, TargetReplicationStats, UsageEntry};
pub use error::{UsageError, UsageResult};
pub use ingest::{IngestStats, IngestionPipeline, ReportSender};
pub use local::{LocalObjectLayer, LocalObjectStore};
pub use memory::{MemoryObjectLayer, MemoryObjectStore};
pub use metrics::{UsageMetrics, usage_metrics};
pub use migrate::{MIGRATIONS, Migration};
pub use replication::{ReplicationConfig, ReplicationConfigSource, StaticReplicationConfigs};
pub use report::{BucketTargetUsageInfo, BucketUsageInfo, ClusterUsageReport};
pub use report_store::ReportStore;
pub use tree::{TreeInfo, UsageTree, UsageTreeBuilder};
