//! Core type definitions for ObjectIO
//!
//! This module defines the identifiers shared by the usage subsystem:
//! validated bucket names and the address of a shard inside the cluster.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a bucket
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name (validates S3 naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the bucket name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate bucket name according to S3 rules
    fn validate(name: &str) -> Result<(), BucketNameError> {
        // Length check: 3-63 characters
        if name.len() < 3 {
            return Err(BucketNameError::TooShort);
        }
        if name.len() > 63 {
            return Err(BucketNameError::TooLong);
        }

        let bytes = name.as_bytes();
        let first = bytes[0];
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(BucketNameError::InvalidStartChar);
        }

        let last = bytes[bytes.len() - 1];
        if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
            return Err(BucketNameError::InvalidEndChar);
        }

        // Only lowercase letters, numbers, hyphens, and periods allowed
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '.')
        {
            return Err(BucketNameError::InvalidChar(c));
        }

        if name.contains("..") {
            return Err(BucketNameError::ConsecutivePeriods);
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(BucketNameError::LooksLikeIpAddress);
        }

        Ok(())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.0)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a bucket name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name must be at least 3 characters")]
    TooShort,
    #[error("bucket name must be at most 63 characters")]
    TooLong,
    #[error("bucket name must start with a lowercase letter or number")]
    InvalidStartChar,
    #[error("bucket name must end with a lowercase letter or number")]
    InvalidEndChar,
    #[error("bucket name contains invalid character: {0}")]
    InvalidChar(char),
    #[error("bucket name cannot contain consecutive periods")]
    ConsecutivePeriods,
    #[error("bucket name cannot be formatted as an IP address")]
    LooksLikeIpAddress,
}

/// Address of one shard (erasure set) in the cluster
///
/// Pools are numbered in the order the object layer reports them, shards
/// in the order their pool lists them.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("pool-{pool}/shard-{shard}")]
pub struct ShardLocation {
    /// Pool index
    pub pool: usize,
    /// Shard index within the pool
    pub shard: usize,
}

impl ShardLocation {
    /// Create a new shard location
    #[must_use]
    pub const fn new(pool: usize, shard: usize) -> Self {
        Self { pool, shard }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bucket_names() {
        assert!(BucketName::new("my-bucket").is_ok());
        assert!(BucketName::new("bucket").is_ok());
        assert!(BucketName::new("logs.2024").is_ok());
        assert!(BucketName::new("123").is_ok());
    }

    #[test]
    fn test_invalid_bucket_names() {
        assert_eq!(BucketName::new("ab"), Err(BucketNameError::TooShort));
        assert_eq!(BucketName::new("a".repeat(64)), Err(BucketNameError::TooLong));
        assert_eq!(
            BucketName::new(".objectio.sys"),
            Err(BucketNameError::InvalidStartChar)
        );
        assert_eq!(BucketName::new("bucket-"), Err(BucketNameError::InvalidEndChar));
        assert_eq!(
            BucketName::new("my/bucket"),
            Err(BucketNameError::InvalidChar('/'))
        );
        assert_eq!(
            BucketName::new("my..bucket"),
            Err(BucketNameError::ConsecutivePeriods)
        );
        assert_eq!(
            BucketName::new("192.168.1.1"),
            Err(BucketNameError::LooksLikeIpAddress)
        );
    }

    #[test]
    fn test_shard_location_display() {
        let loc = ShardLocation::new(1, 7);
        assert_eq!(loc.to_string(), "pool-1/shard-7");
        assert!(ShardLocation::new(0, 9) < loc);
    }
}
