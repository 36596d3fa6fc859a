//! A sharded, reference-counted LRU cache.
//!
//! Values live behind an `Arc`: a [`CacheHandle`] is one borrowed reference,
//! and the cache's own membership is another. A value's `Drop` is the
//! deleter and runs exactly once, when the entry has been evicted or erased
//! *and* every outstanding handle has been released. Erasing an entry while
//! handles are outstanding is therefore always safe.

use crate::LError;
use linked_hash_map_rs::LinkedHashMap;
use once_cell::sync::OnceCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Slot<V> {
    cell: OnceCell<Arc<V>>,
    charge: usize,
    // set once the filled slot has been moved into the LRU list
    published: AtomicBool,
}

impl<V> Slot<V> {
    fn empty(charge: usize) -> Arc<Self> {
        Arc::new(Self {
            cell: OnceCell::new(),
            charge,
            published: AtomicBool::new(false),
        })
    }

    fn filled(value: Arc<V>, charge: usize) -> Arc<Self> {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        Arc::new(Self {
            cell,
            charge,
            published: AtomicBool::new(true),
        })
    }
}

/// One acquisition of a cache entry. Dropping it is the release.
pub struct CacheHandle<V> {
    value: Arc<V>,
}

impl<V> CacheHandle<V> {
    pub fn value(&self) -> &V {
        self.value.as_ref()
    }

    pub fn release(self) {}
}

impl<V> Deref for CacheHandle<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref()
    }
}

impl<V: Debug> Debug for CacheHandle<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheHandle").field(self.value.as_ref()).finish()
    }
}

struct Shard<K: Hash + Eq + Clone, V> {
    entries: LinkedHashMap<K, Arc<Slot<V>>>,
    // slots whose value is still being built; not charged, never evicted
    pending: HashMap<K, Arc<Slot<V>>>,
    usage: usize,
    capacity: usize,
}

// Slots dropped by a shard operation; the caller drops them after the shard
// lock is released so deleters never run under it.
type Evicted<V> = Vec<Arc<Slot<V>>>;

impl<K: Hash + Eq + Clone, V> Shard<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: LinkedHashMap::new(),
            pending: HashMap::new(),
            usage: 0,
            capacity,
        }
    }

    fn touch(&mut self, k: &K) -> Option<Arc<Slot<V>>> {
        self.entries.move_to_back(k).map(|(_, slot)| slot.clone())
    }

    fn detach(&mut self, k: &K) -> Option<Arc<Slot<V>>> {
        let slot = self.entries.get(k).cloned()?;
        self.entries.remove(k);
        self.usage -= slot.charge;
        Some(slot)
    }

    fn attach(&mut self, k: K, slot: Arc<Slot<V>>) -> Evicted<V> {
        let mut evicted: Evicted<V> = self.detach(&k).into_iter().collect();
        self.usage += slot.charge;
        self.entries.push_back(k, slot);
        while self.usage > self.capacity {
            match self.entries.pop_front() {
                None => break,
                Some((_, old)) => {
                    self.usage -= old.charge;
                    evicted.push(old);
                }
            }
        }
        evicted
    }

    fn slot_for(&mut self, k: K, charge: usize) -> Arc<Slot<V>> {
        if let Some(slot) = self.touch(&k) {
            return slot;
        }
        self.pending
            .entry(k)
            .or_insert_with(|| Slot::empty(charge))
            .clone()
    }

    fn forget_pending(&mut self, k: &K, slot: &Arc<Slot<V>>) {
        if self.pending.get(k).map_or(false, |p| Arc::ptr_eq(p, slot)) {
            self.pending.remove(k);
        }
    }

    fn publish(&mut self, k: K, slot: Arc<Slot<V>>) -> Evicted<V> {
        self.forget_pending(&k, &slot);
        if slot.published.swap(true, Ordering::AcqRel) {
            return vec![];
        }
        self.attach(k, slot)
    }
}

pub struct LruCache<K: Hash + Eq + Clone, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    shard_bits: usize,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_shards(capacity, 0)
    }

    /// Splits the cache into `2^shard_bits` independently locked shards,
    /// each holding an equal part of `capacity`.
    pub fn with_shards(capacity: usize, shard_bits: usize) -> Self {
        let shard_bits = shard_bits.min(16);
        let n = 1usize << shard_bits;
        let per_shard = (capacity + n - 1) / n;
        Self {
            shards: (0..n).map(|_| Mutex::new(Shard::new(per_shard))).collect(),
            shard_bits,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn shard_index(&self, k: &K) -> usize {
        if self.shard_bits == 0 {
            return 0;
        }
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        (h.finish() >> (64 - self.shard_bits)) as usize
    }

    fn shard(&self, k: &K) -> MutexGuard<'_, Shard<K, V>> {
        self.lock(self.shard_index(k))
    }

    // A panic inside a deleter never leaves a shard half-updated, so a
    // poisoned lock is still consistent.
    fn lock(&self, i: usize) -> MutexGuard<'_, Shard<K, V>> {
        self.shards[i].lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, k: &K) -> Option<CacheHandle<V>> {
        let slot = self.shard(k).touch(k)?;
        slot.cell.get().map(|v| CacheHandle { value: v.clone() })
    }

    /// Inserts `value`, replacing any previous entry for `k`, and returns a
    /// handle to the new entry.
    pub fn insert(&self, k: K, value: V, charge: usize) -> CacheHandle<V> {
        let value = Arc::new(value);
        let evicted = self.shard(&k).attach(k, Slot::filled(value.clone(), charge));
        drop(evicted);
        CacheHandle { value }
    }

    /// Returns the cached value for `k`, running `init` to build it on a
    /// miss. Concurrent callers for the same key share a single `init` run;
    /// callers for other keys are never blocked by it. The entry only joins
    /// the LRU list, and only counts against capacity, once `init` has
    /// succeeded. A failed `init` leaves nothing behind in the cache.
    pub fn get_or_try_insert_with<F>(
        &self,
        k: K,
        charge: usize,
        init: F,
    ) -> Result<CacheHandle<V>, LError>
    where
        F: FnOnce() -> Result<V, LError>,
    {
        let slot = self.shard(&k).slot_for(k.clone(), charge);
        match slot.cell.get_or_try_init(|| init().map(Arc::new)) {
            Ok(v) => {
                let handle = CacheHandle { value: v.clone() };
                if !slot.published.load(Ordering::Acquire) {
                    let evicted = self.shard(&k).publish(k, slot);
                    drop(evicted);
                }
                Ok(handle)
            }
            Err(e) => {
                self.shard(&k).forget_pending(&k, &slot);
                Err(e)
            }
        }
    }

    /// Drops the cache's own reference to `k`. Outstanding handles stay
    /// valid. No-op when absent.
    pub fn erase(&self, k: &K) -> bool {
        let removed = self.shard(k).detach(k);
        removed.is_some()
    }

    pub fn contains(&self, k: &K) -> bool {
        self.shard(k).entries.get(k).is_some()
    }

    /// Keys whose value is being built right now.
    pub fn pending(&self) -> usize {
        (0..self.shards.len()).map(|i| self.lock(i).pending.len()).sum()
    }

    pub fn len(&self) -> usize {
        (0..self.shards.len()).map(|i| self.lock(i).entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_charge(&self) -> usize {
        (0..self.shards.len()).map(|i| self.lock(i).usage).sum()
    }
}
