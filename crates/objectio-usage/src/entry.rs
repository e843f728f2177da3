//! Usage entries: the statistics recorded for one node of a usage tree

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Object size histogram interval: `[start, end]`, both inclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeInterval {
    pub start: u64,
    pub end: u64,
    pub name: &'static str,
}

/// Intervals of [`SizeHistogram`], in bucket order
pub const OBJECT_SIZE_INTERVALS: [SizeInterval; 7] = [
    SizeInterval { start: 0, end: KIB - 1, name: "LESS_THAN_1024_B" },
    SizeInterval { start: KIB, end: MIB - 1, name: "BETWEEN_1024_B_AND_1_MB" },
    SizeInterval { start: MIB, end: 10 * MIB - 1, name: "BETWEEN_1_MB_AND_10_MB" },
    SizeInterval { start: 10 * MIB, end: 64 * MIB - 1, name: "BETWEEN_10_MB_AND_64_MB" },
    SizeInterval { start: 64 * MIB, end: 128 * MIB - 1, name: "BETWEEN_64_MB_AND_128_MB" },
    SizeInterval { start: 128 * MIB, end: 512 * MIB - 1, name: "BETWEEN_128_MB_AND_512_MB" },
    SizeInterval { start: 512 * MIB, end: u64::MAX, name: "GREATER_THAN_512_MB" },
];

/// Count of objects per size interval
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHistogram([u64; 7]);

impl SizeHistogram {
    /// Record one object of `size` bytes
    pub fn add(&mut self, size: u64) {
        if let Some(idx) = OBJECT_SIZE_INTERVALS
            .iter()
            .position(|iv| size >= iv.start && size <= iv.end)
        {
            self.0[idx] = self.0[idx].saturating_add(1);
        }
    }

    /// Counts keyed by interval name, as exposed in usage reports
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        OBJECT_SIZE_INTERVALS
            .iter()
            .zip(self.0.iter())
            .map(|(iv, count)| (iv.name.to_string(), *count))
            .collect()
    }
}

/// Replication counters for one replication target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReplicationStats {
    /// Bytes waiting to be replicated
    pub pending_size: u64,
    /// Objects waiting to be replicated
    pub pending_count: u64,
    /// Bytes that failed to replicate
    pub failed_size: u64,
    /// Objects that failed to replicate
    pub failed_count: u64,
    /// Bytes replicated successfully
    pub replicated_size: u64,
    /// Objects replicated successfully
    pub replicated_count: u64,
}

/// Statistics recorded for one usage tree node
///
/// Sizes and counts of a non-leaf entry already include its descendants;
/// the scanner aggregates bottom-up before persisting, and nothing in this
/// crate recomputes them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// Total bytes
    pub size: u64,
    /// Number of objects
    pub objects: u64,
    /// Number of object versions
    pub versions: u64,
    /// Object size distribution
    pub obj_sizes: SizeHistogram,
    /// Replication counters keyed by replication target ARN
    pub replication: BTreeMap<String, TargetReplicationStats>,
    /// Path identifiers of direct children
    pub children: BTreeSet<String>,
}

impl UsageEntry {
    /// Entry for a single object version of `size` bytes
    #[must_use]
    pub fn with_object(size: u64) -> Self {
        let mut entry = Self {
            size,
            objects: 1,
            versions: 1,
            ..Self::default()
        };
        entry.obj_sizes.add(size);
        entry
    }

    /// Entry carrying only a size, as scanners record compacted folders
    #[must_use]
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}
