//! The chain-of-responsibility cache layer contract.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use strata_core::{DenseData, Fingerprint, Range, SparseData, Uri};

/// A layer in the chain, shared across requesting tasks.
pub type SharedLayer = Arc<dyn CacheLayer>;

/// One node of the cache hierarchy.
///
/// A layer answers [`get_data`](CacheLayer::get_data) from local state when
/// it can, otherwise forwards to the next (slower) layer and records the
/// bytes into its own store on the way back. Ownership of the layers rests
/// with the constructing caller; each layer holds its downstream neighbour
/// behind an `Arc` and the chain is linear.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Serve `range` of the asset `uri` names. Resolves to `None` when no
    /// layer in the chain can supply the bytes — the only failure surface of
    /// the cache API. Callers must not assume whether the result was
    /// produced synchronously or after downstream work.
    async fn get_data(&self, uri: &Uri, range: Range) -> Option<SparseData>;

    /// Remove the asset from this layer and every layer below it.
    /// Best-effort: a missing entry is not an error. In-flight requests are
    /// unaffected; only future requests see the removal.
    async fn purge(&self, id: &Fingerprint);

    /// Re-point this layer at a different downstream layer, or detach it.
    fn set_next(&self, next: Option<SharedLayer>);

    /// Record bytes in this layer's local store, subject to its policy.
    /// Called on the fill path as data travels back up the chain; a no-op
    /// for non-caching layers.
    async fn populate_cache(&self, id: &Fingerprint, data: &DenseData);

    /// Complete pending work before teardown, then cascade downstream.
    /// Must not return while any requester remains undelivered.
    async fn shutdown(&self);
}

/// A layer's forward pointer, swappable at runtime.
pub struct NextLayer(RwLock<Option<SharedLayer>>);

impl NextLayer {
    pub fn new(next: Option<SharedLayer>) -> Self {
        Self(RwLock::new(next))
    }

    pub fn get(&self) -> Option<SharedLayer> {
        self.0.read().expect("next-layer lock poisoned").clone()
    }

    pub fn set(&self, next: Option<SharedLayer>) {
        *self.0.write().expect("next-layer lock poisoned") = next;
    }
}
