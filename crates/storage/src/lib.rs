//! Blob store abstraction for the strata disk cache.
//!
//! This crate provides:
//! - The [`BlobStore`] trait: flat keyed blobs with atomic replacement and
//!   ranged reads
//! - A local filesystem backend

pub mod error;
pub mod filesystem;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use filesystem::FilesystemStore;
pub use traits::BlobStore;
