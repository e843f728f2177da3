//! Local-disk object stores
//!
//! Layout of a local cluster directory:
//!
//! ```text
//! <root>/cluster/<bucket>/<key>                  cluster-level objects
//! <root>/pool-<i>/shard-<j>/<bucket>/<key>       per-shard objects
//! ```
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so a reader never sees a half-written object.

use crate::backend::{ObjectLayer, ObjectStore, ShardPool, ShardTopology};
use async_trait::async_trait;
use bytes::Bytes;
use objectio_common::{Error, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const CLUSTER_DIR: &str = "cluster";
const POOL_DIR_PREFIX: &str = "pool-";
const SHARD_DIR_PREFIX: &str = "shard-";

/// Object store rooted at a directory, one sub-directory per bucket
#[derive(Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl LocalObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a bucket if it does not exist
    pub async fn make_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        check_relative(bucket)?;
        if bucket.contains('/') {
            return Err(Error::invalid_argument(format!("invalid bucket: {bucket}")));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<(PathBuf, PathBuf)> {
        check_relative(key)?;
        let dir = self.bucket_dir(bucket)?;
        let path = dir.join(key);
        Ok((dir, path))
    }
}

/// Reject keys that would escape the bucket directory
fn check_relative(name: &str) -> Result<()> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(Error::invalid_argument(format!("invalid object path: {name:?}")));
    }
    Ok(())
}

async fn dir_exists(dir: &Path) -> Result<bool> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let (dir, path) = self.object_path(bucket, key)?;
        if !dir_exists(&dir).await? {
            return Err(Error::BucketNotFound(bucket.to_string()));
        }
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::object_not_found(bucket, key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let (dir, path) = self.object_path(bucket, key)?;
        if !dir_exists(&dir).await? {
            return Err(Error::BucketNotFound(bucket.to_string()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| Error::internal(format!("object path has no parent: {}", path.display())))?;
        tokio::fs::create_dir_all(parent).await?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".tmp-{}-{seq}", std::process::id()));
        let tmp = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

impl ObjectLayer for LocalObjectStore {}

/// Sharded object layer over a local cluster directory
#[derive(Debug)]
pub struct LocalObjectLayer {
    cluster: LocalObjectStore,
    pools: Vec<Vec<Arc<LocalObjectStore>>>,
}

impl LocalObjectLayer {
    /// Create a cluster directory with the given number of shards per pool
    pub fn create(root: impl AsRef<Path>, shards_per_pool: &[usize]) -> Result<Self> {
        let root = root.as_ref();
        for (pool, &count) in shards_per_pool.iter().enumerate() {
            for shard in 0..count {
                std::fs::create_dir_all(
                    root.join(format!("{POOL_DIR_PREFIX}{pool}"))
                        .join(format!("{SHARD_DIR_PREFIX}{shard}")),
                )?;
            }
        }
        Self::open(root)
    }

    /// Open an existing cluster directory, discovering its pools and shards
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let cluster = LocalObjectStore::open(root.join(CLUSTER_DIR))?;

        let mut pools = Vec::new();
        for pool_dir in numbered_dirs(root, POOL_DIR_PREFIX)? {
            let shards = numbered_dirs(&pool_dir, SHARD_DIR_PREFIX)?
                .into_iter()
                .map(|dir| LocalObjectStore::open(dir).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            pools.push(shards);
        }

        debug!(
            "Opened local cluster at {} with {} pools",
            root.display(),
            pools.len()
        );
        Ok(Self { cluster, pools })
    }

    /// Store holding cluster-level objects
    #[must_use]
    pub const fn cluster(&self) -> &LocalObjectStore {
        &self.cluster
    }

    /// One shard's store
    #[must_use]
    pub fn shard(&self, pool: usize, shard: usize) -> Option<&Arc<LocalObjectStore>> {
        self.pools.get(pool).and_then(|p| p.get(shard))
    }

    /// Create a bucket on the cluster store and on every shard
    pub async fn make_bucket(&self, bucket: &str) -> Result<()> {
        self.cluster.make_bucket(bucket).await?;
        for shard in self.pools.iter().flatten() {
            shard.make_bucket(bucket).await?;
        }
        Ok(())
    }
}

/// Sub-directories named `<prefix><n>`, sorted by `n`
fn numbered_dirs(parent: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix(prefix))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(index) = index {
            found.push((index, entry.path()));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[async_trait]
impl ObjectStore for LocalObjectLayer {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.cluster.get_object(bucket, key).await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.cluster.put_object(bucket, key, data).await
    }
}

impl ShardTopology for LocalObjectLayer {
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

impl ObjectLayer for LocalObjectLayer {
    fn shard_topology(&self) -> Option<&dyn ShardTopology> {
        Some(self)
    }
}
