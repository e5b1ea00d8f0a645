//! Eviction policies.
//!
//! A policy owns its bookkeeping behind its own mutex, separate from the
//! [`CacheMap`](crate::map::CacheMap) lock. That split is what makes
//! promotion from a shared-lock reader legal.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use strata_core::Fingerprint;

/// Per-entry bookkeeping created by [`CachePolicy::create`]. Opaque to the
/// map that stores it; only the policy reads or writes the contents.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyData {
    charged: u64,
}

impl PolicyData {
    /// The size currently charged against the policy's budget.
    pub fn charged(&self) -> u64 {
        self.charged
    }
}

/// Sink through which [`CachePolicy::allocate_space`] evicts victims.
/// Implemented by the map's write guard, so eviction happens inside the
/// writer the caller already holds.
pub trait EvictionSink {
    fn erase(&mut self, id: &Fingerprint);
}

/// Admission and eviction strategy for one cache layer.
///
/// A policy instance belongs to exactly one layer; sharing one across maps
/// corrupts its occupancy accounting.
pub trait CachePolicy: Send + Sync {
    /// Called on first insert of an entry.
    fn create(&self, id: &Fingerprint, size: u64) -> PolicyData;

    /// Called on eviction or purge.
    fn destroy(&self, id: &Fingerprint, data: &PolicyData);

    /// Mark the entry as used, promoting it in recency order.
    fn touch(&self, id: &Fingerprint, data: &PolicyData);

    /// Touch the entry and record its new total size.
    fn touch_and_update(&self, id: &Fingerprint, data: &mut PolicyData, new_size: u64);

    /// Free at least `required` bytes by evicting victims through the sink.
    /// Returns `false`, evicting nothing, when `required` alone exceeds the
    /// budget; the caller must not insert in that case.
    fn allocate_space(&self, required: u64, sink: &mut dyn EvictionSink) -> bool;
}

/// Least-recently-used policy with a hard byte budget.
///
/// Recency is a monotonic sequence number per entry: touching an entry
/// re-stamps it, eviction walks from the lowest stamp.
pub struct LruPolicy {
    budget: u64,
    inner: Mutex<LruInner>,
}

#[derive(Default)]
struct LruInner {
    used: u64,
    next_seq: u64,
    by_seq: BTreeMap<u64, Fingerprint>,
    seq_of: HashMap<Fingerprint, u64>,
}

impl LruInner {
    fn stamp(&mut self, id: Fingerprint) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_seq.insert(seq, id);
        self.seq_of.insert(id, seq);
    }

    fn promote(&mut self, id: &Fingerprint) {
        if let Some(seq) = self.seq_of.get(id).copied() {
            self.by_seq.remove(&seq);
            self.stamp(*id);
        }
    }
}

impl LruPolicy {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            inner: Mutex::new(LruInner::default()),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Bytes currently charged against the budget.
    pub fn used(&self) -> u64 {
        self.inner().used
    }

    fn inner(&self) -> MutexGuard<'_, LruInner> {
        self.inner.lock().expect("lru state poisoned")
    }
}

impl CachePolicy for LruPolicy {
    fn create(&self, id: &Fingerprint, size: u64) -> PolicyData {
        let mut inner = self.inner();
        inner.stamp(*id);
        inner.used += size;
        PolicyData { charged: size }
    }

    fn destroy(&self, id: &Fingerprint, data: &PolicyData) {
        let mut inner = self.inner();
        if let Some(seq) = inner.seq_of.remove(id) {
            inner.by_seq.remove(&seq);
        }
        inner.used = inner.used.saturating_sub(data.charged);
    }

    fn touch(&self, id: &Fingerprint, _data: &PolicyData) {
        self.inner().promote(id);
    }

    fn touch_and_update(&self, id: &Fingerprint, data: &mut PolicyData, new_size: u64) {
        let mut inner = self.inner();
        inner.promote(id);
        inner.used = inner.used.saturating_sub(data.charged) + new_size;
        data.charged = new_size;
    }

    fn allocate_space(&self, required: u64, sink: &mut dyn EvictionSink) -> bool {
        if required > self.budget {
            return false;
        }
        loop {
            // Pick the victim with the state lock released before erasing:
            // the erase calls back into destroy, which takes the same lock.
            let victim = {
                let inner = self.inner();
                if self.budget.saturating_sub(inner.used) >= required {
                    return true;
                }
                inner.by_seq.values().next().copied()
            };
            match victim {
                Some(id) => sink.erase(&id),
                None => {
                    let inner = self.inner();
                    return self.budget.saturating_sub(inner.used) >= required;
                }
            }
        }
    }
}
