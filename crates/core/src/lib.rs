//! Core domain types for the strata content-distribution cache.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content fingerprints (SHA-256) and origin URIs
//! - Byte-range arithmetic, including whole-file ranges
//! - Dense and sparse representations of partially-downloaded assets
//! - Chain configuration

pub mod config;
pub mod data;
pub mod error;
pub mod fingerprint;
pub mod range;
pub mod uri;

pub use config::{ChainConfig, DiskCacheConfig, MemoryCacheConfig, NetworkConfig};
pub use data::{DenseData, SparseData};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use range::Range;
pub use uri::{Uri, UriContext};

/// Default memory-layer budget: 64 MiB
pub const DEFAULT_MEMORY_BUDGET: u64 = 64 * 1024 * 1024;

/// Default disk-layer budget: 1 GiB
pub const DEFAULT_DISK_BUDGET: u64 = 1024 * 1024 * 1024;
