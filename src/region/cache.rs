//! Bounded LRU cache of region extractions
//!
//! The manager is keyed by [`Region`] value equality (coordinates only)
//! and keeps a strict LRU order: every hit promotes, inserts evict from
//! the cold end once the bound is reached.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use parking_lot::ReentrantMutex;
use tracing::warn;

use super::segment::{RegionCache, RegionSegment};
use super::Region;

#[derive(Default)]
struct Inner {
    cache: HashMap<Region, RegionCache>,
    // Recency order, front = most recently used
    lru: VecDeque<Region>,
}

impl Inner {
    fn promote(&mut self, region: &Region) {
        if let Some(pos) = self.lru.iter().position(|r| r == region) {
            self.lru.remove(pos);
        }
        self.lru.push_front(region.clone());
    }

    fn evict_lru_if_needed(&mut self, max_size: usize) {
        while self.cache.len() >= max_size {
            let Some(coldest) = self.lru.pop_back() else {
                break;
            };
            self.cache.remove(&coldest);
        }
    }

    fn lookup(&mut self, region: &Region) -> Option<RegionCache> {
        if !self.cache.contains_key(region) {
            return None;
        }
        self.promote(region);
        let entry = self.cache.get_mut(region)?;
        entry.mark_accessed();
        Some(entry.clone())
    }
}

/// LRU-bounded cache of region data for repeated or random access.
///
/// Guarded by a re-entrant lock so processing callbacks that fire while
/// the cache is held may re-enter read paths without deadlocking.
/// Lookups on a manager that has not been [`initialize`](Self::initialize)d
/// miss unconditionally.
pub struct RegionCacheManager {
    inner: ReentrantMutex<RefCell<Inner>>,
    max_size: usize,
    initialized: ReentrantMutex<RefCell<bool>>,
}

impl RegionCacheManager {
    /// Create a manager bounded at `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner::default())),
            max_size,
            initialized: ReentrantMutex::new(RefCell::new(false)),
        }
    }

    /// Open the manager for lookups.
    pub fn initialize(&self) {
        *self.initialized.lock().borrow_mut() = true;
    }

    /// True once [`initialize`](Self::initialize) has been called.
    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock().borrow()
    }

    /// Insert or refresh the cache entry for `cache.source_region`.
    ///
    /// Existing entries are overwritten in place and promoted; new entries
    /// evict from the cold end first when the cache is full.
    pub fn cache_region(&self, cache: RegionCache) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let region = cache.source_region.clone();
        if inner.cache.contains_key(&region) {
            inner.cache.insert(region.clone(), cache);
            inner.promote(&region);
        } else {
            inner.evict_lru_if_needed(self.max_size);
            inner.cache.insert(region.clone(), cache);
            inner.lru.push_front(region);
        }
    }

    /// Cache a segment's data under its source region, if the segment
    /// carries any.
    pub fn cache_segment(&self, segment: &RegionSegment) {
        if segment.is_cached {
            self.cache_region(segment.cache.clone());
        }
    }

    /// Look up the cache entry for a region, promoting it on a hit.
    pub fn get_cached_region(&self, region: &Region) -> Option<RegionCache> {
        if !self.is_initialized() {
            return None;
        }
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.lookup(region)
    }

    /// Look up a segment's cache entry without blocking.
    ///
    /// Called from processing paths that already hold container locks;
    /// contention is reported as a miss rather than risked as a deadlock.
    pub fn get_cached_segment(&self, segment: &RegionSegment) -> Option<RegionCache> {
        if !self.is_initialized() {
            return None;
        }
        let Some(guard) = self.inner.try_lock() else {
            warn!("region cache contended in get_cached_segment, treating as miss");
            return None;
        };
        let mut inner = guard.borrow_mut();
        inner.lookup(&segment.source_region)
    }

    /// Return a copy of `segment` hydrated with cached data, on a hit.
    pub fn get_segment_with_cache(&self, segment: &RegionSegment) -> Option<RegionSegment> {
        let cache = self.get_cached_region(&segment.source_region)?;
        let mut hydrated = segment.clone();
        hydrated.cache = cache;
        hydrated.is_cached = true;
        Some(hydrated)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.cache.clear();
        inner.lru.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().borrow().cache.len()
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured entry bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataVariant;

    fn cache_for(start: u64, end: u64) -> RegionCache {
        RegionCache {
            data: vec![DataVariant::F64(vec![start as f64])],
            source_region: Region::span(vec![start], vec![end]),
            ..Default::default()
        }
    }

    #[test]
    fn uninitialized_manager_always_misses() {
        let manager = RegionCacheManager::new(4);
        manager.cache_region(cache_for(0, 1));
        assert!(manager.get_cached_region(&Region::span(vec![0], vec![1])).is_none());

        manager.initialize();
        assert!(manager.get_cached_region(&Region::span(vec![0], vec![1])).is_some());
    }

    #[test]
    fn hit_increments_access_count() {
        let manager = RegionCacheManager::new(4);
        manager.initialize();
        manager.cache_region(cache_for(0, 1));
        let region = Region::span(vec![0], vec![1]);
        manager.get_cached_region(&region);
        let entry = manager.get_cached_region(&region).unwrap();
        assert_eq!(entry.access_count, 2);
    }

    #[test]
    fn eviction_drops_coldest_entry() {
        let manager = RegionCacheManager::new(2);
        manager.initialize();
        manager.cache_region(cache_for(0, 1));
        manager.cache_region(cache_for(2, 3));
        // Touch the older entry so it becomes MRU
        manager.get_cached_region(&Region::span(vec![0], vec![1]));

        // Third insert evicts the now-coldest [2,3]
        manager.cache_region(cache_for(4, 5));
        assert_eq!(manager.len(), 2);
        assert!(manager.get_cached_region(&Region::span(vec![2], vec![3])).is_none());
        assert!(manager.get_cached_region(&Region::span(vec![0], vec![1])).is_some());
        assert!(manager.get_cached_region(&Region::span(vec![4], vec![5])).is_some());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let manager = RegionCacheManager::new(2);
        manager.initialize();
        manager.cache_region(cache_for(0, 1));
        manager.cache_region(cache_for(2, 3));

        let mut refreshed = cache_for(0, 1);
        refreshed.data = vec![DataVariant::F64(vec![9.0])];
        manager.cache_region(refreshed);

        assert_eq!(manager.len(), 2);
        let entry = manager.get_cached_region(&Region::span(vec![0], vec![1])).unwrap();
        assert_eq!(entry.data, vec![DataVariant::F64(vec![9.0])]);
    }

    #[test]
    fn segment_round_trip() {
        let manager = RegionCacheManager::new(4);
        manager.initialize();

        let region = Region::span(vec![0], vec![3]);
        let mut segment = RegionSegment::from_region(region.clone());
        segment.mark_cached(vec![DataVariant::F64(vec![1.0, 2.0, 3.0, 4.0])]);
        manager.cache_segment(&segment);

        let mut cold = RegionSegment::from_region(region);
        assert!(!cold.is_cached);
        assert!(manager.get_cached_segment(&cold).is_some());

        cold = manager.get_segment_with_cache(&cold).unwrap();
        assert!(cold.is_cached);
        assert_eq!(cold.cache.data.len(), 1);
    }

    #[test]
    fn uncached_segment_is_not_stored() {
        let manager = RegionCacheManager::new(4);
        manager.initialize();
        let segment = RegionSegment::from_region(Region::span(vec![0], vec![3]));
        manager.cache_segment(&segment);
        assert!(manager.is_empty());
    }

    #[test]
    fn clear_empties_cache() {
        let manager = RegionCacheManager::new(4);
        manager.initialize();
        manager.cache_region(cache_for(0, 1));
        manager.clear();
        assert!(manager.is_empty());
        assert_eq!(manager.max_size(), 4);
    }
}
