//! Layered byte-range cache for content-addressed assets.
//!
//! This crate provides:
//! - [`CachePolicy`] and the [`LruPolicy`] eviction strategy
//! - [`CacheMap`], the reader/writer-locked per-layer index
//! - The [`CacheLayer`] chain contract
//! - The [`MemoryCache`] and [`DiskCache`] layers
//!
//! A chain is linear: each layer forwards misses to the next, slower layer
//! and records the returned bytes locally on the way back, subject to its
//! eviction policy.

pub mod disk;
pub mod layer;
pub mod map;
pub mod memory;
pub mod policy;

pub use disk::DiskCache;
pub use layer::{CacheLayer, NextLayer, SharedLayer};
pub use map::{CacheMap, CacheReader, CacheWriter};
pub use memory::MemoryCache;
pub use policy::{CachePolicy, EvictionSink, LruPolicy, PolicyData};
