//! Region model: inclusive N-dimensional coordinate boxes
//!
//! Regions mark precise locations or segments within signal data: transient
//! onsets, spectral events, zero-crossing boundaries, loop points, analysis
//! results. They are plain value types — cloned freely, never shared mutably.
//!
//! - [`Region`] — an inclusive box with typed attributes
//! - [`RegionGroup`] — a named, ordered collection of regions
//! - [`RegionSegment`] — a sub-window of a region with its own cursor
//! - [`RegionCacheManager`] — bounded LRU cache of region extractions

mod cache;
mod group;
mod segment;

pub use cache::RegionCacheManager;
pub use group::{RegionGroup, RegionSelectionPattern, RegionState, RegionTransition};
pub use segment::{RegionCache, RegionSegment};

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A typed attribute value.
///
/// Regions and groups carry open-ended metadata; the closed set of kinds
/// here keeps lookups type-safe without an erased `Any` map.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttrValue {
    Str(String),
    F64(f64),
    I64(i64),
    U64(u64),
    Bool(bool),
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::F64(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::I64(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::U64(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl AttrValue {
    /// String view, if this is a string attribute.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: `F64`, `I64` and `U64` all convert.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::F64(v) => Some(*v),
            AttrValue::I64(v) => Some(*v as f64),
            AttrValue::U64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean view, if this is a bool attribute.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Attribute map shared by regions and groups.
pub type AttrMap = HashMap<String, AttrValue>;

/// A point or span in N-dimensional space, with inclusive bounds.
///
/// `start_coordinates` and `end_coordinates` always have the same arity.
/// A well-formed region satisfies `start[i] <= end[i]` for every dimension;
/// queries on inverted regions degrade to zero spans rather than panic.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    /// Starting coordinates (inclusive)
    pub start_coordinates: Vec<u64>,
    /// Ending coordinates (inclusive)
    pub end_coordinates: Vec<u64>,
    /// Key-value store for region-specific attributes
    pub attributes: AttrMap,
}

impl Region {
    /// A point-like region (start == end).
    pub fn point(coordinates: Vec<u64>) -> Self {
        Self {
            start_coordinates: coordinates.clone(),
            end_coordinates: coordinates,
            attributes: AttrMap::new(),
        }
    }

    /// A span-like region with inclusive start and end.
    pub fn span(start: Vec<u64>, end: Vec<u64>) -> Self {
        Self {
            start_coordinates: start,
            end_coordinates: end,
            attributes: AttrMap::new(),
        }
    }

    /// A single time point (frame index).
    pub fn time_point(frame: u64, label: &str) -> Self {
        let mut region = Self::point(vec![frame]);
        if !label.is_empty() {
            region.set_label(label);
        }
        region.set_attribute("type", "time_point");
        region
    }

    /// A time span covering `[start_frame, end_frame]`.
    pub fn time_span(start_frame: u64, end_frame: u64, label: &str) -> Self {
        let mut region = Self::span(vec![start_frame], vec![end_frame]);
        if !label.is_empty() {
            region.set_label(label);
        }
        region.set_attribute("type", "time_span");
        region
    }

    /// An audio span over frames and channels.
    pub fn audio_span(
        start_frame: u64,
        end_frame: u64,
        start_channel: u64,
        end_channel: u64,
        label: &str,
    ) -> Self {
        let mut region = Self::span(
            vec![start_frame, start_channel],
            vec![end_frame, end_channel],
        );
        if !label.is_empty() {
            region.set_label(label);
        }
        region.set_attribute("type", "audio_region");
        region
    }

    /// A rectangular image region from top-left to bottom-right.
    pub fn image_rect(x1: u64, y1: u64, x2: u64, y2: u64, label: &str) -> Self {
        let mut region = Self::span(vec![x1, y1], vec![x2, y2]);
        if !label.is_empty() {
            region.set_label(label);
        }
        region.set_attribute("type", "image_rect");
        region
    }

    /// A video region: frame range plus spatial rectangle.
    pub fn video_region(
        start_frame: u64,
        end_frame: u64,
        x1: u64,
        y1: u64,
        x2: u64,
        y2: u64,
        label: &str,
    ) -> Self {
        let mut region = Self::span(vec![start_frame, x1, y1], vec![end_frame, x2, y2]);
        if !label.is_empty() {
            region.set_label(label);
        }
        region.set_attribute("type", "video_region");
        region
    }

    /// Number of dimensions this region spans.
    pub fn rank(&self) -> usize {
        self.start_coordinates.len()
    }

    /// True when start == end in every dimension.
    pub fn is_point(&self) -> bool {
        self.start_coordinates == self.end_coordinates
    }

    /// True when the coordinates lie within the region in every dimension.
    ///
    /// Mismatched coordinate arity returns false, not an error.
    pub fn contains(&self, coordinates: &[u64]) -> bool {
        if coordinates.len() != self.start_coordinates.len() {
            return false;
        }
        coordinates.iter().enumerate().all(|(i, &c)| {
            c >= self.start_coordinates[i] && c <= self.end_coordinates[i]
        })
    }

    /// True when the box intersection with `other` is non-empty.
    pub fn overlaps(&self, other: &Region) -> bool {
        if self.start_coordinates.len() != other.start_coordinates.len() {
            return false;
        }
        (0..self.start_coordinates.len()).all(|i| {
            self.end_coordinates[i] >= other.start_coordinates[i]
                && self.start_coordinates[i] <= other.end_coordinates[i]
        })
    }

    /// Span (element count) along one dimension.
    ///
    /// Zero for an out-of-range dimension index or inverted coordinates.
    pub fn get_span(&self, dimension_index: usize) -> u64 {
        if dimension_index >= self.start_coordinates.len() {
            return 0;
        }
        let start = self.start_coordinates[dimension_index];
        let end = self.end_coordinates[dimension_index];
        if end < start {
            return 0;
        }
        end - start + 1
    }

    /// Total element count: product of spans across all dimensions.
    ///
    /// Zero when the region is empty or any dimension is inverted.
    pub fn get_volume(&self) -> u64 {
        if self.start_coordinates.is_empty() {
            return 0;
        }
        (0..self.start_coordinates.len())
            .map(|i| self.get_span(i))
            .product()
    }

    /// Translate by a signed per-dimension offset, clamping at zero.
    pub fn translate(&self, offset: &[i64]) -> Region {
        let mut result = self.clone();
        let n = offset.len().min(self.start_coordinates.len());
        for i in 0..n {
            result.start_coordinates[i] = shift_clamped(self.start_coordinates[i], offset[i]);
            result.end_coordinates[i] = shift_clamped(self.end_coordinates[i], offset[i]);
        }
        result
    }

    /// Scale about the box center by per-dimension factors.
    ///
    /// Center and half-span use truncating integer division, so odd spans
    /// lose one unit of precision; the result for a span of 5 scaled by 1.0
    /// is a span of 5, but intermediate halves round down.
    pub fn scale(&self, factors: &[f64]) -> Region {
        let mut result = self.clone();
        let n = factors.len().min(self.start_coordinates.len());
        for i in 0..n {
            let center = (self.start_coordinates[i] + self.end_coordinates[i]) / 2;
            let half_span = self.get_span(i) / 2;
            let new_half_span = (half_span as f64 * factors[i]) as u64;
            result.start_coordinates[i] = center.saturating_sub(new_half_span);
            result.end_coordinates[i] = center + new_half_span;
        }
        result
    }

    /// Look up an attribute by key.
    pub fn get_attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Set an attribute by key.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// The `label` attribute, or empty string when unset.
    pub fn label(&self) -> &str {
        self.attributes
            .get("label")
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    /// Set the `label` attribute.
    pub fn set_label(&mut self, label: &str) {
        self.set_attribute("label", label);
    }
}

fn shift_clamped(value: u64, offset: i64) -> u64 {
    if offset < 0 {
        value.saturating_sub(offset.unsigned_abs())
    } else {
        value + offset as u64
    }
}

/// Equality is coordinate-wise; attributes do not participate.
impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.start_coordinates == other.start_coordinates
            && self.end_coordinates == other.end_coordinates
    }
}

impl Eq for Region {}

/// Hash combines start and end coordinate hashes so regions can key
/// unordered maps (the cache manager relies on this).
impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut h1: u64 = 0;
        for &coord in &self.start_coordinates {
            h1 ^= mix(coord).wrapping_add(0x9e3779b9)
                .wrapping_add(h1 << 6)
                .wrapping_add(h1 >> 2);
        }
        let mut h2: u64 = 0;
        for &coord in &self.end_coordinates {
            h2 ^= mix(coord).wrapping_add(0x9e3779b9)
                .wrapping_add(h2 << 6)
                .wrapping_add(h2 >> 2);
        }
        state.write_u64(h1 ^ (h2 << 1));
    }
}

fn mix(v: u64) -> u64 {
    // splitmix64 finalizer
    let mut z = v.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_product_of_spans() {
        let region = Region::span(vec![1, 0], vec![4, 1]);
        assert_eq!(region.get_span(0), 4);
        assert_eq!(region.get_span(1), 2);
        assert_eq!(region.get_volume(), 8);
    }

    #[test]
    fn contains_endpoints() {
        let region = Region::span(vec![2, 1], vec![5, 3]);
        assert!(region.contains(&region.start_coordinates.clone()));
        assert!(region.contains(&region.end_coordinates.clone()));
        assert!(region.contains(&[3, 2]));
        assert!(!region.contains(&[6, 2]));
        // Arity mismatch is false, not an error
        assert!(!region.contains(&[3]));
    }

    #[test]
    fn point_region() {
        let p = Region::point(vec![7, 7]);
        assert!(p.is_point());
        assert_eq!(p.get_volume(), 1);
    }

    #[test]
    fn inverted_region_has_zero_volume() {
        let inverted = Region::span(vec![5], vec![2]);
        assert_eq!(inverted.get_span(0), 0);
        assert_eq!(inverted.get_volume(), 0);
        assert_eq!(Region::default().get_volume(), 0);
    }

    #[test]
    fn overlap_detection() {
        let a = Region::span(vec![0, 0], vec![4, 4]);
        let b = Region::span(vec![4, 4], vec![8, 8]);
        let c = Region::span(vec![5, 5], vec![8, 8]);
        assert!(a.overlaps(&b)); // shared corner, inclusive bounds
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&Region::point(vec![1])));
    }

    #[test]
    fn translate_clamps_at_zero() {
        let region = Region::span(vec![2, 3], vec![4, 5]);
        let moved = region.translate(&[-10, 1]);
        assert_eq!(moved.start_coordinates, vec![0, 4]);
        assert_eq!(moved.end_coordinates, vec![0, 6]);
    }

    #[test]
    fn scale_doubles_about_center() {
        let region = Region::span(vec![4], vec![8]); // center 6, half-span 2
        let scaled = region.scale(&[2.0]);
        assert_eq!(scaled.start_coordinates, vec![2]);
        assert_eq!(scaled.end_coordinates, vec![10]);
    }

    #[test]
    fn scale_odd_span_truncates() {
        // Span 4 (even element count): half-span 4/2 = 2 but span()=4 -> 4/2=2.
        // Span of [1,4] is 4, half 2, center (1+4)/2 = 2 (truncated from 2.5).
        let region = Region::span(vec![1], vec![4]);
        let scaled = region.scale(&[1.0]);
        assert_eq!(scaled.start_coordinates, vec![0]);
        assert_eq!(scaled.end_coordinates, vec![4]);
    }

    #[test]
    fn equality_ignores_attributes() {
        let mut a = Region::span(vec![1], vec![2]);
        let b = Region::span(vec![1], vec![2]);
        a.set_label("marked");
        assert_eq!(a, b);
        assert_ne!(a, Region::span(vec![1], vec![3]));
    }

    #[test]
    fn factory_constructors_stamp_type() {
        let span = Region::time_span(10, 20, "verse");
        assert_eq!(span.label(), "verse");
        assert_eq!(
            span.get_attribute("type").and_then(AttrValue::as_str),
            Some("time_span")
        );

        let rect = Region::image_rect(0, 0, 15, 7, "");
        assert_eq!(rect.get_attribute("label"), None);
        assert_eq!(rect.get_volume(), 16 * 8);
    }

    #[test]
    fn attr_value_conversions() {
        let mut region = Region::point(vec![0]);
        region.set_attribute("rms", 0.5);
        region.set_attribute("count", 3i64);
        region.set_attribute("flag", true);
        assert_eq!(region.get_attribute("rms").and_then(AttrValue::as_f64), Some(0.5));
        assert_eq!(region.get_attribute("count").and_then(AttrValue::as_f64), Some(3.0));
        assert_eq!(region.get_attribute("flag").and_then(AttrValue::as_bool), Some(true));
    }
}
