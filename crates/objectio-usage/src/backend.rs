//! Storage collaborators
//!
//! The usage subsystem persists through the object storage API only. The
//! cluster object layer optionally exposes its shard topology; when it
//! does not, prefix aggregation has nothing to read and returns empty.

use crate::error::{UsageError, UsageResult};
use async_trait::async_trait;
use bytes::Bytes;
use objectio_common::ShardLocation;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Object storage API used for every read and write
///
/// Absence is reported as [`objectio_common::Error::ObjectNotFound`] or
/// [`objectio_common::Error::BucketNotFound`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object
    async fn get_object(&self, bucket: &str, key: &str) -> objectio_common::Result<Bytes>;

    /// Write a whole object, replacing any previous content
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes)
    -> objectio_common::Result<()>;
}

/// Cluster object layer
pub trait ObjectLayer: ObjectStore {
    /// Shard topology, if this layer is erasure-coded across shards
    fn shard_topology(&self) -> Option<&dyn ShardTopology> {
        None
    }
}

/// Pools and shards of a sharded object layer
pub trait ShardTopology: Send + Sync {
    /// Every pool, each listing its shards
    fn pools(&self) -> Vec<ShardPool>;

    /// Every shard with its location, pool by pool
    fn shards(&self) -> Vec<(ShardLocation, Arc<dyn ObjectStore>)> {
        self.pools()
            .into_iter()
            .enumerate()
            .flat_map(|(pool_idx, pool)| {
                pool.shards
                    .into_iter()
                    .enumerate()
                    .map(move |(shard_idx, shard)| (ShardLocation::new(pool_idx, shard_idx), shard))
            })
            .collect()
    }
}

/// One pool of shards
#[derive(Clone, Default)]
pub struct ShardPool {
    pub shards: Vec<Arc<dyn ObjectStore>>,
}

impl ShardPool {
    /// Create a pool from its shards
    pub fn new(shards: Vec<Arc<dyn ObjectStore>>) -> Self {
        Self { shards }
    }
}

impl std::fmt::Debug for ShardPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardPool")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// Run a collaborator call under the caller's cancellation token and a deadline
///
/// Cancellation wins over a result that becomes ready at the same time.
pub(crate) async fn guarded<T, F>(
    operation: &'static str,
    cancel: &CancellationToken,
    deadline: Duration,
    call: F,
) -> UsageResult<T>
where
    F: Future<Output = objectio_common::Result<T>>,
{
    let timed = async {
        match tokio::time::timeout(deadline, call).await {
            Ok(res) => res.map_err(UsageError::from),
            Err(_) => Err(UsageError::Timeout { operation }),
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(UsageError::Cancelled),
        res = timed => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    #[tokio::test]
    async fn test_guarded_passes_result_through() {
        let cancel = CancellationToken::new();
        let res = guarded("read", &cancel, Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);

        let res: UsageResult<()> = guarded("read", &cancel, Duration::from_secs(1), async {
            Err(objectio_common::Error::BucketNotFound("b".into()))
        })
        .await;
        assert!(res.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_guarded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = guarded("read", &cancel, Duration::from_secs(1), async { Ok(1) }).await;
        assert!(matches!(res, Err(UsageError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_deadline() {
        let cancel = CancellationToken::new();
        let res: UsageResult<()> =
            guarded("snapshot read", &cancel, Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            res,
            Err(UsageError::Timeout {
                operation: "snapshot read"
            })
        ));
    }

    #[test]
    fn test_topology_shard_locations() {
        struct TwoPools;
        impl ShardTopology for TwoPools {
            fn pools(&self) -> Vec<ShardPool> {
                let shard = || Arc::new(MemoryObjectStore::new()) as Arc<dyn ObjectStore>;
                vec![
                    ShardPool::new(vec![shard(), shard()]),
                    ShardPool::new(vec![shard()]),
                ]
            }
        }

        let locations: Vec<ShardLocation> = TwoPools.shards().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            locations,
            vec![
                ShardLocation::new(0, 0),
                ShardLocation::new(0, 1),
                ShardLocation::new(1, 0)
            ]
        );
    }
}
