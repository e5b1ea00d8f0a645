//! In-memory cache layer.

use crate::layer::{CacheLayer, NextLayer, SharedLayer};
use crate::map::CacheMap;
use crate::policy::CachePolicy;
use async_trait::async_trait;
use std::sync::Arc;
use strata_core::{DenseData, Fingerprint, Range, SparseData, Uri};

/// Cache layer holding sparse fragment sets in memory.
pub struct MemoryCache {
    map: CacheMap<SparseData>,
    next: NextLayer,
}

impl MemoryCache {
    pub fn new(policy: Arc<dyn CachePolicy>, next: Option<SharedLayer>) -> Arc<Self> {
        Arc::new(Self {
            map: CacheMap::new(policy),
            next: NextLayer::new(next),
        })
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get_data(&self, uri: &Uri, range: Range) -> Option<SparseData> {
        let id = uri.fingerprint();
        {
            let reader = self.map.read();
            if let Some(sparse) = reader.get(&id) {
                if sparse.contains_range(&range) {
                    reader.touch(&id);
                    tracing::debug!(id = %id, range = %range, "memory cache hit");
                    return Some(sparse.clone());
                }
            }
        }

        let next = self.next.get()?;
        let fetched = next.get_data(uri, range).await?;
        for frag in fetched.iter() {
            self.populate_cache(&id, frag).await;
        }
        Some(fetched)
    }

    async fn purge(&self, id: &Fingerprint) {
        {
            let mut writer = self.map.write();
            writer.erase(id);
        }
        if let Some(next) = self.next.get() {
            next.purge(id).await;
        }
    }

    fn set_next(&self, next: Option<SharedLayer>) {
        self.next.set(next);
    }

    async fn populate_cache(&self, id: &Fingerprint, data: &DenseData) {
        if data.is_empty() {
            return;
        }
        let mut writer = self.map.write();
        // The entry being grown must not be the eviction victim.
        writer.touch(id);
        if !writer.allocate(data.len() as u64) {
            tracing::debug!(id = %id, size = data.len(), "fill exceeds memory budget, not caching");
            return;
        }
        writer.insert(*id, SparseData::new(), data.len() as u64);
        if let Some(sparse) = writer.get_mut(id) {
            sparse.insert(data.clone());
            let total = sparse.total_bytes();
            writer.update(id, total);
        }
    }

    async fn shutdown(&self) {
        // No asynchronous work of its own.
        if let Some(next) = self.next.get() {
            next.shutdown().await;
        }
    }
}
