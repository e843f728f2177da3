//! Persisted usage tree snapshots
//!
//! Snapshot format:
//! ```text
//! +--------+---------+--------+---------+--------+
//! | Magic  | Version | Length | Payload | CRC32C |
//! | 4B     | 1B      | 4B LE  | var     | 4B LE  |
//! +--------+---------+--------+---------+--------+
//! ```
//!
//! The payload is the bincode encoding of the tree info and its entries.
//! The checksum covers the payload only.

use crate::backend::{ObjectStore, guarded};
use crate::entry::UsageEntry;
use crate::error::{UsageError, UsageResult};
use crate::path::path_join;
use crate::tree::{TreeInfo, UsageTree};
use bytes::Bytes;
use objectio_common::UsageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Snapshot magic ("OUSG")
const SNAPSHOT_MAGIC: [u8; 4] = *b"OUSG";

/// First snapshot format
pub const SNAPSHOT_VERSION_V1: u8 = 1;

/// Format written by this build
pub const SNAPSHOT_VERSION_CURRENT: u8 = SNAPSHOT_VERSION_V1;

/// Magic + version + length
const HEADER_SIZE: usize = 9;

/// CRC32C
const TRAILER_SIZE: usize = 4;

#[derive(Serialize)]
struct PayloadRef<'a> {
    info: &'a TreeInfo,
    entries: &'a BTreeMap<String, UsageEntry>,
}

#[derive(Deserialize)]
struct Payload {
    info: TreeInfo,
    entries: BTreeMap<String, UsageEntry>,
}

/// Encode a tree into snapshot bytes
pub fn encode(tree: &UsageTree) -> UsageResult<Vec<u8>> {
    let (info, entries) = tree.parts();
    let payload =
        bincode::serialize(&PayloadRef { info, entries }).map_err(UsageError::SnapshotEncode)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        UsageError::SnapshotEncode(Box::new(bincode::ErrorKind::SizeLimit))
    })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.push(SNAPSHOT_VERSION_CURRENT);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32c::crc32c(&payload).to_le_bytes());
    Ok(buf)
}

/// Decode snapshot bytes into a tree
///
/// Fails on a foreign or unknown-version blob, on truncation, on checksum
/// mismatch and on entries that reference children the tree does not hold.
pub fn decode(data: &[u8]) -> UsageResult<UsageTree> {
    if data.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(UsageError::SnapshotTooShort { len: data.len() });
    }

    let magic = [data[0], data[1], data[2], data[3]];
    if magic != SNAPSHOT_MAGIC {
        return Err(UsageError::SnapshotBadMagic {
            found: u32::from_be_bytes(magic),
        });
    }

    let version = data[4];
    if version != SNAPSHOT_VERSION_V1 {
        return Err(UsageError::UnsupportedSnapshotVersion(version));
    }

    let declared = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
    let available = data.len() - HEADER_SIZE - TRAILER_SIZE;
    if declared > available {
        return Err(UsageError::SnapshotTruncated {
            declared,
            available,
        });
    }
    if declared < available {
        return Err(UsageError::SnapshotCorrupt(format!(
            "{} trailing bytes after checksum",
            available - declared
        )));
    }

    let payload = &data[HEADER_SIZE..HEADER_SIZE + declared];
    let trailer = &data[HEADER_SIZE + declared..];
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32c::crc32c(payload);
    if expected != actual {
        return Err(UsageError::SnapshotChecksumMismatch { expected, actual });
    }

    let Payload { info, entries } = bincode::deserialize(payload)?;
    validate_links(&entries)?;
    Ok(UsageTree::from_parts(info, entries))
}

fn validate_links(entries: &BTreeMap<String, UsageEntry>) -> UsageResult<()> {
    for (id, entry) in entries {
        if entry.children.contains(id) {
            return Err(UsageError::SnapshotCorrupt(format!(
                "entry {id} lists itself as a child"
            )));
        }
        if let Some(missing) = entry.children.iter().find(|c| !entries.contains_key(*c)) {
            return Err(UsageError::SnapshotCorrupt(format!(
                "entry {id} references missing child {missing}"
            )));
        }
    }
    Ok(())
}

/// Object key of a snapshot inside the metadata bucket
fn snapshot_key(config: &UsageConfig, path: &str) -> String {
    path_join(&[&config.bucket_meta_prefix, path])
}

impl UsageTree {
    /// Load the snapshot stored at `path` (`<bucket>/<snapshot name>`) on a shard
    ///
    /// `Ok(None)` when the shard holds no snapshot there; an error when the
    /// read fails or the stored bytes do not decode.
    pub async fn load(
        shard: &dyn ObjectStore,
        config: &UsageConfig,
        path: &str,
        cancel: &CancellationToken,
    ) -> UsageResult<Option<Self>> {
        let key = snapshot_key(config, path);
        let read = guarded(
            "usage snapshot read",
            cancel,
            config.shard_io_timeout(),
            shard.get_object(&config.meta_bucket, &key),
        )
        .await;

        match read {
            Ok(data) => decode(&data).map(Some),
            Err(e) if e.is_not_found() => {
                debug!("No usage snapshot at {}/{}", config.meta_bucket, key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist this tree as the snapshot at `path` on a shard
    pub async fn save(
        &self,
        shard: &dyn ObjectStore,
        config: &UsageConfig,
        path: &str,
        cancel: &CancellationToken,
    ) -> UsageResult<()> {
        let data = Bytes::from(encode(self)?);
        let key = snapshot_key(config, path);
        guarded(
            "usage snapshot write",
            cancel,
            config.shard_io_timeout(),
            shard.put_object(&config.meta_bucket, &key, data),
        )
        .await
    }
}
