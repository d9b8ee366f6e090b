//! Named, ordered collections of regions

use super::{AttrMap, AttrValue, Region};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How regions are selected for processing or playback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionSelectionPattern {
    /// Process all regions
    All,
    /// Process regions in order
    #[default]
    Sequential,
    /// Random selection
    Random,
    /// Cycle through regions
    RoundRobin,
    /// Weighted random selection
    Weighted,
    /// Overlapping selection
    Overlap,
    /// Mutually exclusive selection
    Exclusive,
}

/// How transitions between regions are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionTransition {
    /// No transition, jump directly
    #[default]
    Immediate,
    /// Crossfade between regions
    Crossfade,
    /// Overlap regions during transition
    Overlap,
    /// Hard gate between regions
    Gated,
}

/// Processing state for regions and segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionState {
    /// Not being processed
    #[default]
    Idle,
    /// Data being loaded
    Loading,
    /// Ready for processing
    Ready,
    /// Currently being processed
    Active,
    /// In transition to another region
    Transitioning,
    /// Being removed from memory
    Unloading,
}

/// A categorized collection of related regions.
///
/// Groups organize regions by analytical criteria — "transients",
/// "formants", "zero_crossings" — with group-level attributes and a
/// navigation cursor for sequential or patterned traversal.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionGroup {
    /// Descriptive name of the group
    pub name: String,
    /// Regions belonging to this group, in insertion order
    pub regions: Vec<Region>,
    /// Group-level attributes
    pub attributes: AttrMap,
    /// Lifecycle state of the group
    pub state: RegionState,
    /// How transitions between regions are handled
    pub transition_type: RegionTransition,
    /// How regions are selected during traversal
    pub selection_pattern: RegionSelectionPattern,
    /// Index of the region the group cursor currently points at
    pub current_region_index: usize,
    /// Indices of regions currently considered active
    pub active_indices: Vec<usize>,
}

impl RegionGroup {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a group pre-populated with regions.
    pub fn with_regions(name: impl Into<String>, regions: Vec<Region>) -> Self {
        Self {
            name: name.into(),
            regions,
            ..Default::default()
        }
    }

    /// Append a region.
    pub fn add_region(&mut self, region: Region) {
        self.regions.push(region);
    }

    /// Insert a region at an index; out-of-range indices append.
    pub fn insert_region(&mut self, index: usize, region: Region) {
        if index >= self.regions.len() {
            self.regions.push(region);
        } else {
            self.regions.insert(index, region);
        }
    }

    /// Remove the region at an index, clamping the cursor back into range.
    pub fn remove_region(&mut self, index: usize) {
        if index < self.regions.len() {
            self.regions.remove(index);
            if self.current_region_index >= self.regions.len() && !self.regions.is_empty() {
                self.current_region_index = self.regions.len() - 1;
            }
        }
    }

    /// Remove all regions and reset navigation state.
    pub fn clear_regions(&mut self) {
        self.regions.clear();
        self.current_region_index = 0;
        self.active_indices.clear();
    }

    /// Number of regions in the group.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when the group holds no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sort regions by their start coordinate along one dimension.
    ///
    /// Regions lacking that dimension keep their relative order.
    pub fn sort_by_dimension(&mut self, dimension_index: usize) {
        self.regions.sort_by(|a, b| {
            let ka = a.start_coordinates.get(dimension_index);
            let kb = b.start_coordinates.get(dimension_index);
            match (ka, kb) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => std::cmp::Ordering::Equal,
            }
        });
    }

    /// Sort regions by a numeric attribute; regions lacking it keep order.
    pub fn sort_by_attribute(&mut self, attr_name: &str) {
        self.regions.sort_by(|a, b| {
            let ka = a.get_attribute(attr_name).and_then(AttrValue::as_f64);
            let kb = b.get_attribute(attr_name).and_then(AttrValue::as_f64);
            match (ka, kb) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => std::cmp::Ordering::Equal,
            }
        });
    }

    /// All regions whose `label` attribute equals `label`.
    pub fn find_regions_with_label(&self, label: &str) -> Vec<&Region> {
        self.regions.iter().filter(|r| r.label() == label).collect()
    }

    /// All regions carrying `key` with exactly `value`.
    pub fn find_regions_with_attribute(&self, key: &str, value: &AttrValue) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| r.get_attribute(key) == Some(value))
            .collect()
    }

    /// All regions containing the given coordinates.
    pub fn find_regions_containing(&self, coordinates: &[u64]) -> Vec<&Region> {
        self.regions
            .iter()
            .filter(|r| r.contains(coordinates))
            .collect()
    }

    /// Bounding box containing every region in the group.
    ///
    /// Stamped with `type = "bounding_box"` and `source_group`.
    pub fn bounding_region(&self) -> Region {
        let Some(first) = self.regions.first() else {
            return Region::default();
        };
        let mut min_coords = first.start_coordinates.clone();
        let mut max_coords = first.end_coordinates.clone();
        for region in &self.regions {
            for i in 0..min_coords.len() {
                if i < region.start_coordinates.len() {
                    min_coords[i] = min_coords[i].min(region.start_coordinates[i]);
                    max_coords[i] = max_coords[i].max(region.end_coordinates[i]);
                }
            }
        }
        let mut bounds = Region::span(min_coords, max_coords);
        bounds.set_attribute("type", "bounding_box");
        bounds.set_attribute("source_group", self.name.as_str());
        bounds
    }

    /// Look up a group-level attribute.
    pub fn get_attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Set a group-level attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(start: u64, end: u64, label: &str) -> Region {
        Region::time_span(start, end, label)
    }

    #[test]
    fn remove_clamps_cursor() {
        let mut group = RegionGroup::with_regions(
            "marks",
            vec![labeled(0, 1, "a"), labeled(2, 3, "b"), labeled(4, 5, "c")],
        );
        group.current_region_index = 2;
        group.remove_region(2);
        assert_eq!(group.len(), 2);
        assert_eq!(group.current_region_index, 1);

        // Removing out-of-range index is a no-op
        group.remove_region(9);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn insert_out_of_range_appends() {
        let mut group = RegionGroup::new("marks");
        group.insert_region(5, labeled(0, 1, "a"));
        group.insert_region(0, labeled(2, 3, "b"));
        assert_eq!(group.regions[0].label(), "b");
        assert_eq!(group.regions[1].label(), "a");
    }

    #[test]
    fn sort_by_dimension_orders_starts() {
        let mut group = RegionGroup::with_regions(
            "marks",
            vec![labeled(8, 9, "late"), labeled(0, 1, "early"), labeled(4, 5, "mid")],
        );
        group.sort_by_dimension(0);
        let labels: Vec<_> = group.regions.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["early", "mid", "late"]);
    }

    #[test]
    fn sort_by_attribute_numeric() {
        let mut a = labeled(0, 1, "a");
        a.set_attribute("rms", 0.9);
        let mut b = labeled(2, 3, "b");
        b.set_attribute("rms", 0.1);
        let mut group = RegionGroup::with_regions("rms", vec![a, b]);
        group.sort_by_attribute("rms");
        assert_eq!(group.regions[0].label(), "b");
    }

    #[test]
    fn searches() {
        let mut tagged = labeled(2, 3, "onset");
        tagged.set_attribute("confidence", 0.8);
        let group = RegionGroup::with_regions(
            "events",
            vec![labeled(0, 1, "onset"), tagged, labeled(6, 9, "decay")],
        );

        assert_eq!(group.find_regions_with_label("onset").len(), 2);
        assert_eq!(
            group
                .find_regions_with_attribute("confidence", &AttrValue::F64(0.8))
                .len(),
            1
        );
        assert_eq!(group.find_regions_containing(&[7]).len(), 1);
        assert_eq!(group.find_regions_containing(&[1]).len(), 1);
    }

    #[test]
    fn bounding_region_covers_all() {
        let group = RegionGroup::with_regions(
            "marks",
            vec![
                Region::span(vec![2, 1], vec![4, 2]),
                Region::span(vec![0, 3], vec![1, 5]),
            ],
        );
        let bounds = group.bounding_region();
        assert_eq!(bounds.start_coordinates, vec![0, 1]);
        assert_eq!(bounds.end_coordinates, vec![4, 5]);
        assert_eq!(
            bounds.get_attribute("source_group").and_then(AttrValue::as_str),
            Some("marks")
        );
    }

    #[test]
    fn bounding_region_of_empty_group() {
        assert_eq!(RegionGroup::new("empty").bounding_region(), Region::default());
    }
}
