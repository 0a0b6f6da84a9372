//! Reference-counted cache units and the bounded block cache.
//!
//! A cache unit is the atomic block managed by the caching engine: a
//! contiguous run of whole stored rows for a fixed band chunk. Units are
//! shared by handle ([`Arc`]); the handle count doubles as the reference
//! count, so the eviction scan can only ever free a unit whose sole handle
//! is the cache's own. That structural rule is what keeps an active cursor
//! from losing the bytes under it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lru::LruCache;

/// Shared handle to a cache unit. Dropping the last non-cache handle makes
/// the unit eligible for eviction again.
pub type UnitHandle = Arc<CacheUnit>;

/// Identity of a unit within one cache: the stored row and band its block
/// starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub start_row: usize,
    pub start_band: usize,
}

/// One reference-counted block of raw bytes.
#[derive(Debug)]
pub struct CacheUnit {
    start_row: usize,
    rows: usize,
    start_band: usize,
    bands: usize,
    byte_len: usize,
    data: RwLock<Vec<u8>>,
    dirty: AtomicBool,
}

impl CacheUnit {
    /// Wrap `data` as the unit covering `rows` stored rows from
    /// `start_row` and `bands` bands from `start_band`.
    pub fn new(start_row: usize, rows: usize, start_band: usize, bands: usize, data: Vec<u8>) -> Self {
        Self {
            start_row,
            rows,
            start_band,
            bands,
            byte_len: data.len(),
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn start_row(&self) -> usize {
        self.start_row
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn start_band(&self) -> usize {
        self.start_band
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Size of the unit's data block in bytes. Fixed at creation.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Read access to the unit's bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap()
    }

    /// Write access to the unit's bytes. Marks the unit dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.dirty.store(true, Ordering::Relaxed);
        self.data.write().unwrap()
    }

    /// Whether the unit has been mutated since the last write-back.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Clear the dirty flag after a successful write-back, or after an
    /// initial fill that should not count as a mutation.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }
}

/// Bounded pool of cache units with approximately least-recently-used
/// replacement.
///
/// Capacity is accounted in bytes. A unit whose handle is held outside the
/// cache is never evicted; when every unit is referenced the pool grows past
/// its capacity instead.
#[derive(Debug)]
pub struct BlockCache {
    capacity_bytes: usize,
    current_bytes: usize,
    units: LruCache<UnitKey, UnitHandle>,
}

impl BlockCache {
    /// Create a cache bounded at `capacity_bytes`.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            current_bytes: 0,
            units: LruCache::unbounded(),
        }
    }

    /// Look up a unit, refreshing its recency on a hit.
    pub fn get(&mut self, key: &UnitKey) -> Option<UnitHandle> {
        self.units.get(key).cloned()
    }

    /// Insert a freshly fetched unit, evicting unreferenced units while the
    /// pool is over capacity.
    ///
    /// Returns the evicted units; the caller must write back any that are
    /// dirty before dropping them.
    pub fn insert(&mut self, key: UnitKey, unit: UnitHandle) -> Vec<UnitHandle> {
        let mut evicted = Vec::new();
        let unit_bytes = unit.byte_len();

        if let Some(old) = self.units.pop(&key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.byte_len());
            evicted.push(old);
        }

        while self.current_bytes + unit_bytes > self.capacity_bytes && !self.units.is_empty() {
            let candidates = self.units.len();
            let mut freed = false;
            for _ in 0..candidates {
                match self.units.pop_lru() {
                    Some((held_key, held)) if Arc::strong_count(&held) > 1 => {
                        // Borrowed by a live accessor; give it another pass.
                        self.units.put(held_key, held);
                    }
                    Some((_, idle)) => {
                        self.current_bytes = self.current_bytes.saturating_sub(idle.byte_len());
                        log::debug!(
                            "evicting unit at row {} band {} ({} bytes)",
                            idle.start_row(),
                            idle.start_band(),
                            idle.byte_len()
                        );
                        evicted.push(idle);
                        freed = true;
                        break;
                    }
                    None => break,
                }
            }
            if !freed {
                log::debug!(
                    "all {} cached units referenced; growing past {} byte capacity",
                    self.units.len(),
                    self.capacity_bytes
                );
                break;
            }
        }

        self.current_bytes += unit_bytes;
        self.units.put(key, unit);
        evicted
    }

    /// Handles of every dirty unit currently in the pool, oldest first.
    /// The units stay cached; callers clear the dirty flag after write-back.
    pub fn dirty_units(&self) -> Vec<UnitHandle> {
        let mut dirty: Vec<UnitHandle> = self
            .units
            .iter()
            .filter(|(_, unit)| unit.is_dirty())
            .map(|(_, unit)| Arc::clone(unit))
            .collect();
        dirty.reverse();
        dirty
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }
}
