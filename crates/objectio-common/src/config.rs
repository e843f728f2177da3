//! Configuration types for ObjectIO
//!
//! This module defines the configuration consumed by the usage subsystem.
//! Every field has a default so an empty TOML file is a valid config.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Usage accounting configuration
    #[serde(default)]
    pub usage: UsageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::configuration(format!("invalid TOML: {e}")))?;
        config.usage.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Usage accounting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Reserved bucket holding internal metadata
    #[serde(default = "default_meta_bucket")]
    pub meta_bucket: String,
    /// Prefix inside the metadata bucket for per-bucket metadata
    #[serde(default = "default_bucket_meta_prefix")]
    pub bucket_meta_prefix: String,
    /// File name of the per-bucket usage snapshot inside a shard
    #[serde(default = "default_snapshot_name")]
    pub snapshot_name: String,
    /// File name of the cluster-wide usage report
    #[serde(default = "default_report_name")]
    pub report_name: String,
    /// Deadline for one shard snapshot read or write (milliseconds)
    #[serde(default = "default_shard_io_timeout_ms")]
    pub shard_io_timeout_ms: u64,
    /// Deadline for one report read or write (milliseconds)
    #[serde(default = "default_report_io_timeout_ms")]
    pub report_io_timeout_ms: u64,
    /// Maximum shard snapshots read concurrently by one aggregation
    #[serde(default = "default_max_concurrent_shard_reads")]
    pub max_concurrent_shard_reads: usize,
    /// Reports queued ahead of the ingestion consumer
    #[serde(default = "default_ingest_queue_depth")]
    pub ingest_queue_depth: usize,
}

fn default_meta_bucket() -> String {
    ".objectio.sys".to_string()
}

fn default_bucket_meta_prefix() -> String {
    "buckets".to_string()
}

fn default_snapshot_name() -> String {
    ".usage-cache.bin".to_string()
}

fn default_report_name() -> String {
    ".usage.json".to_string()
}

const fn default_shard_io_timeout_ms() -> u64 {
    10_000
}

const fn default_report_io_timeout_ms() -> u64 {
    30_000
}

const fn default_max_concurrent_shard_reads() -> usize {
    32
}

const fn default_ingest_queue_depth() -> usize {
    1
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            meta_bucket: default_meta_bucket(),
            bucket_meta_prefix: default_bucket_meta_prefix(),
            snapshot_name: default_snapshot_name(),
            report_name: default_report_name(),
            shard_io_timeout_ms: default_shard_io_timeout_ms(),
            report_io_timeout_ms: default_report_io_timeout_ms(),
            max_concurrent_shard_reads: default_max_concurrent_shard_reads(),
            ingest_queue_depth: default_ingest_queue_depth(),
        }
    }
}

impl UsageConfig {
    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("meta_bucket", &self.meta_bucket),
            ("bucket_meta_prefix", &self.bucket_meta_prefix),
            ("snapshot_name", &self.snapshot_name),
            ("report_name", &self.report_name),
        ] {
            if value.is_empty() {
                return Err(Error::configuration(format!("usage.{field} must not be empty")));
            }
        }
        if self.max_concurrent_shard_reads == 0 {
            return Err(Error::configuration(
                "usage.max_concurrent_shard_reads must be at least 1",
            ));
        }
        if self.ingest_queue_depth == 0 {
            return Err(Error::configuration(
                "usage.ingest_queue_depth must be at least 1",
            ));
        }
        Ok(())
    }

    /// Snapshot path relative to the bucket metadata prefix: `<bucket>/<snapshot_name>`
    #[must_use]
    pub fn snapshot_path(&self, bucket: &str) -> String {
        format!("{bucket}/{}", self.snapshot_name)
    }

    /// Object key of the cluster-wide report inside the metadata bucket
    #[must_use]
    pub fn report_key(&self) -> String {
        format!("{}/{}", self.bucket_meta_prefix, self.report_name)
    }

    /// Shard snapshot read and write deadline
    #[must_use]
    pub const fn shard_io_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_io_timeout_ms)
    }

    /// Report read/write deadline
    #[must_use]
    pub const fn report_io_timeout(&self) -> Duration {
        Duration::from_millis(self.report_io_timeout_ms)
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
