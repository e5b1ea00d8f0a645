//! Reader/writer-locked index from fingerprint to a layer's per-entry
//! payload.
//!
//! The map pairs each payload with the policy's opaque bookkeeping and keeps
//! the two in lockstep: every key in the map has exactly one live policy
//! record. Readers share the lock and may still promote entries, because the
//! policy guards its own state separately.

use crate::policy::{CachePolicy, EvictionSink, PolicyData};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_core::Fingerprint;

struct Entry<T> {
    info: T,
    policy_data: PolicyData,
}

/// The indexed store inside a cache layer.
pub struct CacheMap<T> {
    entries: RwLock<BTreeMap<Fingerprint, Entry<T>>>,
    policy: Arc<dyn CachePolicy>,
}

impl<T> CacheMap<T> {
    pub fn new(policy: Arc<dyn CachePolicy>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            policy,
        }
    }

    /// Take the shared lock. Any number of readers may coexist.
    pub fn read(&self) -> CacheReader<'_, T> {
        CacheReader {
            entries: self.entries.read().expect("cache map lock poisoned"),
            policy: &self.policy,
        }
    }

    /// Take the exclusive lock. Taking a second writer on the same map from
    /// one thread deadlocks; route allocations through
    /// [`CacheWriter::allocate`] on the writer already held.
    pub fn write(&self) -> CacheWriter<'_, T> {
        CacheWriter {
            entries: self.entries.write().expect("cache map lock poisoned"),
            policy: &self.policy,
            evicted: Vec::new(),
        }
    }
}

/// Shared-lock view of a [`CacheMap`].
pub struct CacheReader<'a, T> {
    entries: RwLockReadGuard<'a, BTreeMap<Fingerprint, Entry<T>>>,
    policy: &'a Arc<dyn CachePolicy>,
}

impl<T> CacheReader<'_, T> {
    pub fn get(&self, id: &Fingerprint) -> Option<&T> {
        self.entries.get(id).map(|entry| &entry.info)
    }

    /// Promote the entry in the policy's recency order. Legal under the
    /// shared lock because policy state is guarded separately.
    pub fn touch(&self, id: &Fingerprint) {
        if let Some(entry) = self.entries.get(id) {
            self.policy.touch(id, &entry.policy_data);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &T)> {
        self.entries.iter().map(|(id, entry)| (id, &entry.info))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Exclusive-lock view of a [`CacheMap`].
///
/// Erased payloads accumulate in the guard rather than being dropped under
/// the lock; the layer drains them with [`CacheWriter::take_evicted`] after
/// releasing the guard and runs any cleanup (file deletion, callbacks) with
/// no lock held.
pub struct CacheWriter<'a, T> {
    entries: RwLockWriteGuard<'a, BTreeMap<Fingerprint, Entry<T>>>,
    policy: &'a Arc<dyn CachePolicy>,
    evicted: Vec<(Fingerprint, T)>,
}

impl<T> CacheWriter<'_, T> {
    pub fn get(&self, id: &Fingerprint) -> Option<&T> {
        self.entries.get(id).map(|entry| &entry.info)
    }

    pub fn get_mut(&mut self, id: &Fingerprint) -> Option<&mut T> {
        self.entries.get_mut(id).map(|entry| &mut entry.info)
    }

    pub fn contains(&self, id: &Fingerprint) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a new entry, a no-op if the key is already present. Returns
    /// whether the insertion happened; `policy.create` runs only on the
    /// inserted path. Follow up with [`CacheWriter::update`] once the
    /// entry's real total size is known.
    pub fn insert(&mut self, id: Fingerprint, info: T, size: u64) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        let policy_data = self.policy.create(&id, size);
        self.entries.insert(id, Entry { info, policy_data });
        true
    }

    pub fn touch(&self, id: &Fingerprint) {
        if let Some(entry) = self.entries.get(id) {
            self.policy.touch(id, &entry.policy_data);
        }
    }

    /// Touch the entry and record its new total size.
    pub fn update(&mut self, id: &Fingerprint, new_size: u64) {
        if let Some(entry) = self.entries.get_mut(id) {
            self.policy
                .touch_and_update(id, &mut entry.policy_data, new_size);
        }
    }

    /// Remove the entry, running the policy's destroy bookkeeping. The
    /// payload is parked in the evicted list for post-lock cleanup.
    pub fn erase(&mut self, id: &Fingerprint) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                self.policy.destroy(id, &entry.policy_data);
                self.evicted.push((*id, entry.info));
                true
            }
            None => false,
        }
    }

    /// Drain the map in iteration order, destroying every entry.
    pub fn erase_all(&mut self) {
        let drained = std::mem::take(&mut *self.entries);
        for (id, entry) in drained {
            self.policy.destroy(&id, &entry.policy_data);
            self.evicted.push((id, entry.info));
        }
    }

    /// Make room for `required` bytes through the policy, evicting through
    /// this writer. Returns `false` iff `required` alone exceeds the budget.
    pub fn allocate(&mut self, required: u64) -> bool {
        let policy = Arc::clone(self.policy);
        policy.allocate_space(required, self)
    }

    /// Payloads erased through this writer, in eviction order.
    pub fn take_evicted(&mut self) -> Vec<(Fingerprint, T)> {
        std::mem::take(&mut self.evicted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> EvictionSink for CacheWriter<'_, T> {
    fn erase(&mut self, id: &Fingerprint) {
        CacheWriter::erase(self, id);
    }
}
