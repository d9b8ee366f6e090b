//! Dimension metadata and coordinate math
//!
//! A container's shape is an ordered list of [`DataDimension`]s; the order
//! determines linear-index layout. All coordinate math here assumes the
//! row-major convention (last dimension varies fastest) unless a layout
//! argument says otherwise.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How multi-dimensional data is mapped to linear memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemoryLayout {
    /// Last dimension varies fastest (C style)
    RowMajor,
    /// First dimension varies fastest (Fortran style)
    ColumnMajor,
}

/// How logical units (channels, frames) are stored in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrganizationStrategy {
    /// Single payload with interleaved data (LRLR for stereo)
    Interleaved,
    /// Separate payload per logical unit (LL..RR for stereo)
    Planar,
}

/// Semantic role of a dimension.
///
/// Lets generic algorithms adapt to data structure without hard-coding
/// what axis 0 means for a given modality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DimensionRole {
    /// Temporal progression (samples, frames, steps)
    Time,
    /// Parallel streams (audio channels, color channels)
    Channel,
    /// Spectral/frequency axis
    Frequency,
    /// Spatial X axis (images, tensors)
    SpatialX,
    /// Spatial Y axis
    SpatialY,
    /// Spatial Z axis
    SpatialZ,
    /// Composed of grouped components (e.g. color per pixel)
    Grouped,
    /// User-defined or application-specific
    Custom,
}

/// One axis of an N-dimensional dataset: semantic role plus structure.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataDimension {
    /// Human-readable identifier
    pub name: String,
    /// Number of elements in this dimension
    pub size: u64,
    /// Memory stride (elements between consecutive indices)
    pub stride: u64,
    /// Semantic hint for common operations
    pub role: DimensionRole,
}

impl DataDimension {
    /// Create a dimension descriptor.
    pub fn new(name: impl Into<String>, size: u64, stride: u64, role: DimensionRole) -> Self {
        Self {
            name: name.into(),
            size,
            stride,
            role,
        }
    }

    /// Temporal (time) dimension.
    pub fn time(samples: u64) -> Self {
        Self::new("time", samples, 1, DimensionRole::Time)
    }

    /// Channel dimension.
    pub fn channel(count: u64) -> Self {
        Self::new("channel", count, 1, DimensionRole::Channel)
    }

    /// Frequency dimension.
    pub fn frequency(bins: u64) -> Self {
        Self::new("frequency", bins, 1, DimensionRole::Frequency)
    }

    /// Spatial dimension along the given axis (`'x'`, `'y'` or `'z'`).
    pub fn spatial(size: u64, axis: char) -> Self {
        let role = match axis {
            'y' => DimensionRole::SpatialY,
            'z' => DimensionRole::SpatialZ,
            _ => DimensionRole::SpatialX,
        };
        Self::new(format!("spatial_{axis}"), size, 1, role)
    }

    /// Dimension whose elements are groups of components (e.g. RGBA per pixel).
    pub fn grouped(name: impl Into<String>, element_count: u64, components: u64) -> Self {
        Self::new(name, element_count, components, DimensionRole::Grouped)
    }
}

/// Convert N-dimensional coordinates to a linear index (row-major).
///
/// Missing trailing coordinates are treated as zero, matching the
/// container convention of addressing a frame by its leading coordinates.
pub fn coordinates_to_linear(coords: &[u64], dimensions: &[DataDimension]) -> u64 {
    let mut index = 0u64;
    let mut multiplier = 1u64;
    for i in (0..dimensions.len()).rev() {
        if i < coords.len() {
            index += coords[i] * multiplier;
        }
        multiplier *= dimensions[i].size;
    }
    index
}

/// Convert a linear index back to N-dimensional coordinates (row-major).
pub fn linear_to_coordinates(index: u64, dimensions: &[DataDimension]) -> Vec<u64> {
    let mut coords = vec![0u64; dimensions.len()];
    let mut remaining = index;
    for i in (0..dimensions.len()).rev() {
        coords[i] = remaining % dimensions[i].size;
        remaining /= dimensions[i].size;
    }
    coords
}

/// Total number of elements described by a dimension list.
///
/// Zero when the list is empty or any dimension has size zero.
pub fn total_elements(dimensions: &[DataDimension]) -> u64 {
    if dimensions.is_empty() {
        return 0;
    }
    if dimensions.iter().any(|d| d.size == 0) {
        return 0;
    }
    dimensions.iter().map(|d| d.size).product()
}

/// Row-major strides for each dimension.
pub fn calculate_strides(dimensions: &[DataDimension]) -> Vec<u64> {
    let mut strides = vec![0u64; dimensions.len()];
    let mut stride = 1u64;
    for i in (0..dimensions.len()).rev() {
        strides[i] = stride;
        stride *= dimensions[i].size;
    }
    strides
}

/// Elements per frame: product of all dimension sizes after the primary.
pub fn frame_size(dimensions: &[DataDimension]) -> u64 {
    if dimensions.is_empty() {
        return 0;
    }
    dimensions.iter().skip(1).map(|d| d.size).product()
}

/// Index of the first dimension with the given role, if any.
pub fn find_dimension_by_role(dimensions: &[DataDimension], role: DimensionRole) -> Option<usize> {
    dimensions.iter().position(|d| d.role == role)
}
