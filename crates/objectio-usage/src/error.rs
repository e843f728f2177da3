//! Usage accounting error types

use thiserror::Error;

/// Usage accounting error
#[derive(Error, Debug)]
pub enum UsageError {
    /// Error returned by a storage collaborator
    #[error("backend error: {0}")]
    Backend(#[from] objectio_common::Error),

    /// Snapshot blob shorter than its fixed header and trailer
    #[error("usage snapshot too short: {len} bytes")]
    SnapshotTooShort { len: usize },

    /// Snapshot blob does not start with the snapshot magic
    #[error("usage snapshot has bad magic {found:#010x}")]
    SnapshotBadMagic { found: u32 },

    /// Snapshot written by an encoder this build does not know
    #[error("unsupported usage snapshot version {0}")]
    UnsupportedSnapshotVersion(u8),

    /// Declared payload length runs past the end of the blob
    #[error("usage snapshot truncated: header declares {declared} payload bytes, {available} present")]
    SnapshotTruncated { declared: usize, available: usize },

    /// Payload checksum mismatch
    #[error("usage snapshot checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    SnapshotChecksumMismatch { expected: u32, actual: u32 },

    /// Tree could not be encoded
    #[error("usage snapshot encode error: {0}")]
    SnapshotEncode(#[source] bincode::Error),

    /// Payload could not be decoded
    #[error("usage snapshot decode error: {0}")]
    SnapshotDecode(#[from] bincode::Error),

    /// Payload decoded but the tree it describes is inconsistent
    #[error("usage snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    /// Report could not be serialized
    #[error("usage report encode error: {0}")]
    ReportEncode(#[source] serde_json::Error),

    /// Persisted report could not be decoded
    #[error("usage report decode error: {0}")]
    ReportDecode(#[source] serde_json::Error),

    /// Replication configuration lookup failed during report migration
    #[error("replication config lookup failed for bucket {bucket}: {source}")]
    ReplicationLookup {
        bucket: String,
        #[source]
        source: objectio_common::Error,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not finish before its deadline
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// The ingestion pipeline consumer is gone
    #[error("usage ingestion pipeline is closed")]
    PipelineClosed,
}

impl UsageError {
    /// Check if this error means "nothing stored here"
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_not_found())
    }

    /// Check if this error is a decode failure of persisted data
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SnapshotTooShort { .. }
                | Self::SnapshotBadMagic { .. }
                | Self::UnsupportedSnapshotVersion(_)
                | Self::SnapshotTruncated { .. }
                | Self::SnapshotChecksumMismatch { .. }
                | Self::SnapshotDecode(_)
                | Self::SnapshotCorrupt(_)
                | Self::ReportDecode(_)
        )
    }
}

/// Result type for usage operations
pub type UsageResult<T> = Result<T, UsageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use objectio_common::Error;

    #[test]
    fn test_not_found_classification() {
        assert!(UsageError::from(Error::BucketNotFound("b".into())).is_not_found());
        assert!(UsageError::from(Error::object_not_found("b", "k")).is_not_found());
        assert!(!UsageError::from(Error::Timeout).is_not_found());
        assert!(!UsageError::Cancelled.is_not_found());
    }

    #[test]
    fn test_corruption_classification() {
        assert!(UsageError::UnsupportedSnapshotVersion(9).is_corruption());
        assert!(UsageError::SnapshotCorrupt("dangling child".into()).is_corruption());
        assert!(!UsageError::Cancelled.is_corruption());
        assert!(!UsageError::from(Error::object_not_found("b", "k")).is_corruption());
    }
}
