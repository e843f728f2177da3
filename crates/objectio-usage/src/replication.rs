//! Bucket replication configuration lookup
//!
//! Only the report migration consults replication configuration: legacy
//! reports recorded one set of replication counters per bucket, and the
//! bucket's configured target tells which ARN they belong to.

use async_trait::async_trait;
use objectio_common::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Replication configuration of one bucket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfig {
    /// ARN of the replication target
    pub role_arn: String,
    /// Destination bucket on the target
    #[serde(default)]
    pub destination_bucket: String,
}

/// Source of bucket replication configuration
#[async_trait]
pub trait ReplicationConfigSource: Send + Sync {
    /// Replication configuration of `bucket`
    async fn get_replication_config(&self, bucket: &str) -> Result<ReplicationConfig>;
}

/// Map-backed replication configuration
#[derive(Debug, Default)]
pub struct StaticReplicationConfigs {
    configs: RwLock<HashMap<String, ReplicationConfig>>,
}

impl StaticReplicationConfigs {
    /// Empty source; every lookup fails
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source holding the given configurations
    #[must_use]
    pub fn from_map(configs: HashMap<String, ReplicationConfig>) -> Self {
        Self {
            configs: RwLock::new(configs),
        }
    }

    /// Load a JSON object of `bucket -> {"roleArn": ..., "destinationBucket": ...}`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let configs: HashMap<String, ReplicationConfig> = serde_json::from_str(&text)
            .map_err(|e| {
                Error::Deserialization(format!("replication config {}: {e}", path.display()))
            })?;
        Ok(Self::from_map(configs))
    }

    /// Set or replace the configuration of a bucket
    pub fn set(&self, bucket: impl Into<String>, config: ReplicationConfig) {
        self.configs.write().insert(bucket.into(), config);
    }
}

#[async_trait]
impl ReplicationConfigSource for StaticReplicationConfigs {
    async fn get_replication_config(&self, bucket: &str) -> Result<ReplicationConfig> {
        self.configs.read().get(bucket).cloned().ok_or_else(|| {
            Error::configuration(format!("no replication config for bucket {bucket}"))
        })
    }
}
