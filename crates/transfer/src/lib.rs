//! Content transfer for the strata cache: the terminal network layer, the
//! HTTP fetcher, name lookup, and chain construction from configuration.

pub mod fetcher;
pub mod http;
pub mod lookup;
pub mod network;

pub use fetcher::{FetchError, FetchResult, Fetcher};
pub use http::HttpFetcher;
pub use lookup::{CachedNameLookup, FetcherNameLookup, NameLookup, NameResponse};
pub use network::NetworkTransfer;

use std::sync::Arc;
use strata_cache::{DiskCache, LruPolicy, MemoryCache, SharedLayer};
use strata_core::ChainConfig;
use strata_storage::{FilesystemStore, StorageResult};

/// Build a cache chain from configuration: memory in front of disk in front
/// of the network transfer, skipping the layers the config omits. The
/// returned layer is the chain's entry point.
pub async fn chain_from_config(
    config: &ChainConfig,
    fetcher: Arc<dyn Fetcher>,
) -> StorageResult<SharedLayer> {
    let mut layer: SharedLayer = NetworkTransfer::new(fetcher);
    if let Some(disk) = &config.disk {
        let store = Arc::new(FilesystemStore::new(&disk.directory).await?);
        layer = DiskCache::open(
            Arc::new(LruPolicy::new(disk.budget_bytes)),
            store,
            Some(layer),
        )
        .await?;
    }
    if let Some(memory) = &config.memory {
        layer = MemoryCache::new(Arc::new(LruPolicy::new(memory.budget_bytes)), Some(layer));
    }
    Ok(layer)
}
