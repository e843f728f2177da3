//! Per-shard usage tree
//!
//! A tree is a flat map from path identifier to [`UsageEntry`]; parent/child
//! links are the identifiers stored in each entry's `children` set, so the
//! structure serializes as-is and holds no references into itself.
//!
//! A tree is immutable once built or loaded. Scanners assemble a new one
//! with [`UsageTreeBuilder`] every cycle and persist it wholesale.

use crate::entry::UsageEntry;
use crate::report::{BucketTargetUsageInfo, BucketUsageInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Bookkeeping stored alongside the entries of a tree
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeInfo {
    /// Name of the tree, the bucket name for per-bucket trees
    pub name: String,
    /// Scan cycle that will next rebuild this tree
    pub next_cycle: u32,
    /// Last time the tree was rebuilt (unix millis)
    pub last_update: u64,
}

/// Hierarchical usage of one shard
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageTree {
    info: TreeInfo,
    entries: BTreeMap<String, UsageEntry>,
}

impl UsageTree {
    pub(crate) fn from_parts(info: TreeInfo, entries: BTreeMap<String, UsageEntry>) -> Self {
        Self { info, entries }
    }

    pub(crate) fn parts(&self) -> (&TreeInfo, &BTreeMap<String, UsageEntry>) {
        (&self.info, &self.entries)
    }

    /// Tree bookkeeping
    #[must_use]
    pub const fn info(&self) -> &TreeInfo {
        &self.info
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the tree holds no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for an exact path identifier
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&UsageEntry> {
        self.entries.get(id)
    }

    /// All `(id, entry)` pairs in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UsageEntry)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Subtree root for a bucket; `None` means no usage recorded here
    #[must_use]
    pub fn find(&self, bucket: &str) -> Option<&UsageEntry> {
        self.entries.get(bucket)
    }

    /// Every descendant of `root`, keyed by its path identifier as stored
    ///
    /// Each value is the descendant's own recorded entry; nothing is summed.
    /// Directory markers are left encoded, so two ids that decode to the
    /// same prefix stay distinct.
    /// Child ids missing from the tree are skipped and a node reachable
    /// twice is emitted once.
    #[must_use]
    pub fn flatten_children<'a>(&'a self, root: &'a UsageEntry) -> HashMap<String, &'a UsageEntry> {
        let mut out = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = root.children.iter().map(String::as_str).collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            out.insert(id.to_string(), entry);
            stack.extend(entry.children.iter().map(String::as_str));
        }
        out
    }

    /// Summarize a bucket root in the report's per-bucket representation
    #[must_use]
    pub fn bucket_usage(&self, bucket: &str) -> Option<BucketUsageInfo> {
        let root = self.find(bucket)?;
        Some(BucketUsageInfo {
            size: root.size,
            objects_count: root.objects,
            versions_count: root.versions,
            objects_size_histogram: root.obj_sizes.to_map(),
            replication_info: root
                .replication
                .iter()
                .map(|(arn, stats)| (arn.clone(), BucketTargetUsageInfo::from(stats)))
                .collect(),
            ..BucketUsageInfo::default()
        })
    }
}

/// Assembles a [`UsageTree`]
#[derive(Debug, Default)]
pub struct UsageTreeBuilder {
    info: TreeInfo,
    entries: BTreeMap<String, UsageEntry>,
}

impl UsageTreeBuilder {
    /// Start a tree with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: TreeInfo {
                name: name.into(),
                ..TreeInfo::default()
            },
            entries: BTreeMap::new(),
        }
    }

    /// Set the next scan cycle
    #[must_use]
    pub const fn with_next_cycle(mut self, cycle: u32) -> Self {
        self.info.next_cycle = cycle;
        self
    }

    /// Set the last update time (unix millis)
    #[must_use]
    pub const fn with_last_update(mut self, millis: u64) -> Self {
        self.info.last_update = millis;
        self
    }

    /// Insert or replace the entry at `id`, linking it under `parent`
    ///
    /// Children already linked to `id` are kept when it is replaced. A
    /// missing parent is created empty.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        mut entry: UsageEntry,
        parent: Option<&str>,
    ) -> &mut Self {
        let id = id.into();
        if let Some(existing) = self.entries.remove(&id) {
            entry.children.extend(existing.children);
        }
        if let Some(parent) = parent {
            self.entries
                .entry(parent.to_string())
                .or_default()
                .children
                .insert(id.clone());
        }
        self.entries.insert(id, entry);
        self
    }

    /// Finish the tree
    #[must_use]
    pub fn build(self) -> UsageTree {
        UsageTree {
            info: self.info,
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TargetReplicationStats;

    fn sample_tree() -> UsageTree {
        let mut b = UsageTreeBuilder::new("bucket").with_next_cycle(3);
        b.insert("bucket", UsageEntry::with_size(175), None)
            .insert("bucket/x", UsageEntry::with_size(100), Some("bucket"))
            .insert("bucket/x/deep", UsageEntry::with_size(60), Some("bucket/x"))
            .insert("bucket/y", UsageEntry::with_size(50), Some("bucket"))
            .insert("bucket/z__OBJDIR__", UsageEntry::with_size(25), Some("bucket"));
        b.build()
    }

    #[test]
    fn test_find_bucket_root() {
        let tree = sample_tree();
        assert_eq!(tree.find("bucket").map(|e| e.size), Some(175));
        assert!(tree.find("other").is_none());
        assert_eq!(tree.info().next_cycle, 3);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_flatten_returns_every_descendant_with_own_size() {
        let tree = sample_tree();
        let root = tree.find("bucket").unwrap();
        let flat = tree.flatten_children(root);

        let mut keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["bucket/x", "bucket/x/deep", "bucket/y", "bucket/z__OBJDIR__"]);
        // Not re-aggregated: x keeps its recorded 100, not 100 + 60
        assert_eq!(flat["bucket/x"].size, 100);
        assert_eq!(flat["bucket/x/deep"].size, 60);
        assert_eq!(flat["bucket/z__OBJDIR__"].size, 25);
    }

    #[test]
    fn test_flatten_keeps_ids_that_decode_alike() {
        let mut b = UsageTreeBuilder::new("bucket");
        b.insert("bucket", UsageEntry::with_size(30), None)
            .insert("bucket/a", UsageEntry::with_size(10), Some("bucket"))
            .insert("bucket/a/f", UsageEntry::with_size(10), Some("bucket/a"))
            .insert("bucket/a__OBJDIR__", UsageEntry::with_size(20), Some("bucket"))
            .insert("bucket/a__OBJDIR__/f", UsageEntry::with_size(20), Some("bucket/a__OBJDIR__"));
        let tree = b.build();

        let flat = tree.flatten_children(tree.find("bucket").unwrap());
        assert_eq!(flat.len(), 4);
        assert_eq!(flat["bucket/a/f"].size, 10);
        assert_eq!(flat["bucket/a__OBJDIR__/f"].size, 20);
    }

    #[test]
    fn test_flatten_leaf_is_empty() {
        let tree = sample_tree();
        let leaf = tree.get("bucket/y").unwrap();
        assert!(tree.flatten_children(leaf).is_empty());
    }

    #[test]
    fn test_flatten_tolerates_cycles_and_dangling_children() {
        let mut b = UsageTreeBuilder::new("bucket");
        let mut root = UsageEntry::with_size(1);
        root.children.insert("bucket/missing".into());
        b.insert("bucket", root, None)
            .insert("bucket/a", UsageEntry::with_size(1), Some("bucket"))
            .insert("bucket/a/b", UsageEntry::with_size(1), Some("bucket/a"));
        let mut looping = UsageEntry::with_size(1);
        looping.children.insert("bucket/a".into());
        b.insert("bucket/a/b", looping, Some("bucket/a"));
        let tree = b.build();

        let flat = tree.flatten_children(tree.find("bucket").unwrap());
        assert_eq!(flat.len(), 2);
        assert!(flat.contains_key("bucket/a"));
        assert!(flat.contains_key("bucket/a/b"));
    }

    #[test]
    fn test_builder_replace_keeps_children() {
        let mut b = UsageTreeBuilder::new("bucket");
        b.insert("bucket/x/1", UsageEntry::with_size(5), Some("bucket/x"));
        b.insert("bucket/x", UsageEntry::with_size(5), Some("bucket"));
        let tree = b.build();
        let x = tree.get("bucket/x").unwrap();
        assert!(x.children.contains("bucket/x/1"));
        assert!(tree.find("bucket").unwrap().children.contains("bucket/x"));
    }

    #[test]
    fn test_bucket_usage_summary() {
        let mut root = UsageEntry::with_object(4096);
        root.replication.insert(
            "arn:target".into(),
            TargetReplicationStats {
                replicated_size: 4096,
                replicated_count: 1,
                ..Default::default()
            },
        );
        let mut b = UsageTreeBuilder::new("bucket");
        b.insert("bucket", root, None);
        let tree = b.build();

        let info = tree.bucket_usage("bucket").unwrap();
        assert_eq!(info.size, 4096);
        assert_eq!(info.objects_count, 1);
        assert_eq!(info.versions_count, 1);
        assert_eq!(info.objects_size_histogram["BETWEEN_1024_B_AND_1_MB"], 1);
        assert_eq!(info.replication_info["arn:target"].replicated_size, 4096);
        assert!(tree.bucket_usage("other").is_none());
    }
}
