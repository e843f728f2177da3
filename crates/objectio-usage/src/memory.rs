//! In-memory object stores
//!
//! Used by tests and by embedders that run the usage subsystem without a
//! real object layer.

use crate::backend::{ObjectLayer, ObjectStore, ShardPool, ShardTopology};
use async_trait::async_trait;
use bytes::Bytes;
use objectio_common::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Object store backed by a map of buckets
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<HashMap<String, HashMap<String, Bytes>>>,
}

impl MemoryObjectStore {
    /// Create an empty store with no buckets
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket if it does not exist
    pub fn make_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// True when the bucket exists
    #[must_use]
    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.read().contains_key(bucket)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::object_not_found(bucket, key))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::BucketNotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }
}

impl ObjectLayer for MemoryObjectStore {}

/// Sharded in-memory object layer
///
/// Cluster-level objects (the usage report) live in a separate store from
/// the shards, as they would on an erasure-coded layer.
#[derive(Debug, Default)]
pub struct MemoryObjectLayer {
    cluster: MemoryObjectStore,
    pools: Vec<Vec<Arc<MemoryObjectStore>>>,
}

impl MemoryObjectLayer {
    /// Create a layer with `shards_per_pool[i]` empty shards in pool `i`
    #[must_use]
    pub fn new(shards_per_pool: &[usize]) -> Self {
        let pools = shards_per_pool
            .iter()
            .map(|&n| (0..n).map(|_| Arc::new(MemoryObjectStore::new())).collect())
            .collect();
        Self {
            cluster: MemoryObjectStore::new(),
            pools,
        }
    }

    /// Store holding cluster-level objects
    #[must_use]
    pub const fn cluster(&self) -> &MemoryObjectStore {
        &self.cluster
    }

    /// One shard's store
    #[must_use]
    pub fn shard(&self, pool: usize, shard: usize) -> Option<&Arc<MemoryObjectStore>> {
        self.pools.get(pool).and_then(|p| p.get(shard))
    }

    /// Create a bucket on the cluster store and on every shard
    pub fn make_bucket(&self, bucket: &str) {
        self.cluster.make_bucket(bucket);
        for shard in self.pools.iter().flatten() {
            shard.make_bucket(bucket);
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectLayer {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.cluster.get_object(bucket, key).await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.cluster.put_object(bucket, key, data).await
    }
}

impl ShardTopology for MemoryObjectLayer {
    fn pools(&self) -> Vec<ShardPool> {
        self.pools
            .iter()
            .map(|shards| {
                ShardPool::new(
                    shards
                        .iter()
                        .map(|s| Arc::clone(s) as Arc<dyn ObjectStore>)
                        .collect(),
                )
            })
            .collect()
    }
}

impl ObjectLayer for MemoryObjectLayer {
    fn shard_topology(&self) -> Option<&dyn ShardTopology> {
        Some(self)
    }
}
