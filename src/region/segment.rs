//! Segments: region sub-windows with a traversal cursor and cache slot

use std::time::{Duration, Instant};

use super::{AttrMap, AttrValue, Region, RegionState};
use crate::data::DataVariant;

/// Cached extraction for a region, with metadata for cache management.
#[derive(Clone, Debug)]
pub struct RegionCache {
    /// Cached data, one payload per channel or dimension slice
    pub data: Vec<DataVariant>,
    /// Region this cache corresponds to
    pub source_region: Region,
    /// When the cache was loaded
    pub load_time: Instant,
    /// Number of times accessed
    pub access_count: u64,
    /// True when the cached data no longer matches the source
    pub is_dirty: bool,
}

impl Default for RegionCache {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            source_region: Region::default(),
            load_time: Instant::now(),
            access_count: 0,
            is_dirty: false,
        }
    }
}

impl RegionCache {
    /// Record an access for recency accounting.
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
    }

    /// Flag the cached data as stale.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Time elapsed since the cache was loaded.
    pub fn age(&self) -> Duration {
        self.load_time.elapsed()
    }
}

/// A discrete sub-window of a region with its own traversal cursor.
///
/// Segments carve a region into pieces that can be cached and walked
/// independently, for non-linear playback and windowed analysis. The
/// cursor is segment-relative: position `[0, 0, ..]` is the segment's
/// own origin, not the region's.
#[derive(Clone, Debug, Default)]
pub struct RegionSegment {
    /// Region this segment belongs to
    pub source_region: Region,
    /// Offset of the segment within the source region
    pub offset_in_region: Vec<u64>,
    /// Size of the segment in each dimension
    pub segment_size: Vec<u64>,
    /// Cached extraction, valid when `is_cached`
    pub cache: RegionCache,
    /// True when `cache` holds data for this segment
    pub is_cached: bool,
    /// Segment-relative traversal cursor
    pub current_position: Vec<u64>,
    /// True while the segment is being processed
    pub is_active: bool,
    /// Lifecycle state
    pub state: RegionState,
    /// Arbitrary processing metadata
    pub processing_metadata: AttrMap,
}

impl RegionSegment {
    /// A segment covering the entire region.
    pub fn from_region(region: Region) -> Self {
        let rank = region.rank();
        let segment_size = (0..rank).map(|i| region.get_span(i)).collect();
        Self {
            source_region: region,
            offset_in_region: vec![0; rank],
            segment_size,
            current_position: vec![0; rank],
            ..Default::default()
        }
    }

    /// A segment covering a sub-window of the region.
    pub fn with_window(region: Region, offset: Vec<u64>, size: Vec<u64>) -> Self {
        let rank = size.len();
        Self {
            source_region: region,
            offset_in_region: offset,
            segment_size: size,
            current_position: vec![0; rank],
            ..Default::default()
        }
    }

    /// Total number of elements in the segment.
    pub fn total_elements(&self) -> u64 {
        self.segment_size.iter().product()
    }

    /// True when a region-relative position falls inside this segment.
    ///
    /// Bounds are half-open: the offset is included, offset + size is not.
    pub fn contains_position(&self, pos: &[u64]) -> bool {
        if pos.len() != self.offset_in_region.len() {
            return false;
        }
        pos.iter().enumerate().all(|(i, &p)| {
            p >= self.offset_in_region[i] && p < self.offset_in_region[i] + self.segment_size[i]
        })
    }

    /// Flag the segment active and transition it to [`RegionState::Active`].
    pub fn mark_active(&mut self) {
        self.is_active = true;
        self.state = RegionState::Active;
    }

    /// Flag the segment inactive and return it to [`RegionState::Idle`].
    pub fn mark_inactive(&mut self) {
        self.is_active = false;
        self.state = RegionState::Idle;
    }

    /// Store cached data for this segment and mark it ready.
    pub fn mark_cached(&mut self, data: Vec<DataVariant>) {
        self.cache.data = data;
        self.cache.source_region = self.source_region.clone();
        self.cache.load_time = Instant::now();
        self.cache.is_dirty = false;
        self.is_cached = true;
        self.state = RegionState::Ready;
    }

    /// Drop the cached data.
    ///
    /// A segment that was only ready because of its cache returns to idle.
    pub fn clear_cache(&mut self) {
        self.cache.data.clear();
        self.is_cached = false;
        if self.state == RegionState::Ready {
            self.state = RegionState::Idle;
        }
    }

    /// Rewind the cursor to the segment origin.
    pub fn reset_position(&mut self) {
        self.current_position.fill(0);
    }

    /// Advance the cursor by `steps` along `dimension`, carrying overflow
    /// into higher dimensions like an odometer.
    ///
    /// Returns true while the cursor remains inside the segment; false once
    /// the last dimension overflows (the end position is preserved so
    /// [`is_at_end`](Self::is_at_end) keeps reporting true).
    pub fn advance_position(&mut self, steps: u64, dimension: usize) -> bool {
        if self.current_position.is_empty()
            || self.segment_size.is_empty()
            || dimension >= self.current_position.len()
        {
            return false;
        }

        self.current_position[dimension] += steps;

        for dim in dimension..self.current_position.len() {
            if self.current_position[dim] < self.segment_size[dim] {
                break;
            }
            if dim == self.current_position.len() - 1 {
                return false;
            }
            let overflow = self.current_position[dim] / self.segment_size[dim];
            self.current_position[dim] %= self.segment_size[dim];
            self.current_position[dim + 1] += overflow;
        }

        !self.is_at_end()
    }

    /// True when the cursor has walked past the last dimension's extent.
    pub fn is_at_end(&self) -> bool {
        if self.current_position.is_empty() || self.segment_size.is_empty() {
            return true;
        }
        let last = self.current_position.len() - 1;
        self.current_position[last] >= self.segment_size[last]
    }

    /// Age of the cached data, `None` when not cached.
    pub fn cache_age(&self) -> Option<Duration> {
        if self.is_cached {
            Some(self.cache.age())
        } else {
            None
        }
    }

    /// Look up processing metadata.
    pub fn get_metadata(&self, key: &str) -> Option<&AttrValue> {
        self.processing_metadata.get(key)
    }

    /// Set processing metadata.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.processing_metadata.insert(key.into(), value.into());
    }
}
