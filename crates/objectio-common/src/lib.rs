//! ObjectIO Common - Shared types and utilities
//!
//! This crate provides the error type, identifiers and configuration
//! shared by the usage accounting crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LoggingConfig, UsageConfig};
pub use error::{Error, Result};
pub use types::*;
