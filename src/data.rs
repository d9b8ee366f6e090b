//! Sample payloads and region data movement
//!
//! [`DataVariant`] is the tagged union every container stores its samples
//! in: one owned vector per supported sample type. Complex samples are
//! stored as two-element arrays (re, im). The free functions here move
//! data between flat storage and [`Region`] boxes using an odometer walk
//! over the inclusive bounds.

use crate::dimension::{coordinates_to_linear, DataDimension};
use crate::error::{EngineError, Result};
use crate::region::Region;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Multi-type sample storage.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataVariant {
    /// High precision floating point
    F64(Vec<f64>),
    /// Standard precision floating point
    F32(Vec<f32>),
    /// 8-bit data (images, compressed audio)
    U8(Vec<u8>),
    /// 16-bit data (CD audio, images)
    U16(Vec<u16>),
    /// 32-bit unsigned data
    U32(Vec<u32>),
    /// 32-bit signed data
    I32(Vec<i32>),
    /// Complex pairs (re, im), single precision
    ComplexF32(Vec<[f32; 2]>),
    /// Complex pairs (re, im), double precision
    ComplexF64(Vec<[f64; 2]>),
}

impl Default for DataVariant {
    fn default() -> Self {
        DataVariant::F64(Vec::new())
    }
}

macro_rules! with_variant {
    ($variant:expr, $vec:ident => $body:expr) => {
        match $variant {
            DataVariant::F64($vec) => $body,
            DataVariant::F32($vec) => $body,
            DataVariant::U8($vec) => $body,
            DataVariant::U16($vec) => $body,
            DataVariant::U32($vec) => $body,
            DataVariant::I32($vec) => $body,
            DataVariant::ComplexF32($vec) => $body,
            DataVariant::ComplexF64($vec) => $body,
        }
    };
}

// Same-kind pairing; mismatched kinds fall through to `$fallback`.
macro_rules! with_variant_pair {
    ($a:expr, $b:expr, $av:ident, $bv:ident => $body:expr, _ => $fallback:expr) => {
        match ($a, $b) {
            (DataVariant::F64($av), DataVariant::F64($bv)) => $body,
            (DataVariant::F32($av), DataVariant::F32($bv)) => $body,
            (DataVariant::U8($av), DataVariant::U8($bv)) => $body,
            (DataVariant::U16($av), DataVariant::U16($bv)) => $body,
            (DataVariant::U32($av), DataVariant::U32($bv)) => $body,
            (DataVariant::I32($av), DataVariant::I32($bv)) => $body,
            (DataVariant::ComplexF32($av), DataVariant::ComplexF32($bv)) => $body,
            (DataVariant::ComplexF64($av), DataVariant::ComplexF64($bv)) => $body,
            _ => $fallback,
        }
    };
}

impl DataVariant {
    /// Number of elements stored.
    pub fn len(&self) -> usize {
        with_variant!(self, v => v.len())
    }

    /// True when no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the stored sample type.
    pub fn kind(&self) -> &'static str {
        match self {
            DataVariant::F64(_) => "f64",
            DataVariant::F32(_) => "f32",
            DataVariant::U8(_) => "u8",
            DataVariant::U16(_) => "u16",
            DataVariant::U32(_) => "u32",
            DataVariant::I32(_) => "i32",
            DataVariant::ComplexF32(_) => "complex_f32",
            DataVariant::ComplexF64(_) => "complex_f64",
        }
    }

    /// A zero-filled variant of the same kind with `len` elements.
    pub fn zeroed_like(&self, len: usize) -> DataVariant {
        match self {
            DataVariant::F64(_) => DataVariant::F64(vec![0.0; len]),
            DataVariant::F32(_) => DataVariant::F32(vec![0.0; len]),
            DataVariant::U8(_) => DataVariant::U8(vec![0; len]),
            DataVariant::U16(_) => DataVariant::U16(vec![0; len]),
            DataVariant::U32(_) => DataVariant::U32(vec![0; len]),
            DataVariant::I32(_) => DataVariant::I32(vec![0; len]),
            DataVariant::ComplexF32(_) => DataVariant::ComplexF32(vec![[0.0; 2]; len]),
            DataVariant::ComplexF64(_) => DataVariant::ComplexF64(vec![[0.0; 2]; len]),
        }
    }

    /// Convert to `f64` samples. Complex values collapse to magnitude.
    pub fn as_f64_vec(&self) -> Vec<f64> {
        match self {
            DataVariant::F64(v) => v.clone(),
            DataVariant::F32(v) => v.iter().map(|&x| x as f64).collect(),
            DataVariant::U8(v) => v.iter().map(|&x| x as f64).collect(),
            DataVariant::U16(v) => v.iter().map(|&x| x as f64).collect(),
            DataVariant::U32(v) => v.iter().map(|&x| x as f64).collect(),
            DataVariant::I32(v) => v.iter().map(|&x| x as f64).collect(),
            DataVariant::ComplexF32(v) => v
                .iter()
                .map(|c| ((c[0] as f64).powi(2) + (c[1] as f64).powi(2)).sqrt())
                .collect(),
            DataVariant::ComplexF64(v) => {
                v.iter().map(|c| (c[0].powi(2) + c[1].powi(2)).sqrt()).collect()
            }
        }
    }

    /// Sample at `index` as `f64`, if in range. Complex collapses to magnitude.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        match self {
            DataVariant::F64(v) => v.get(index).copied(),
            DataVariant::F32(v) => v.get(index).map(|&x| x as f64),
            DataVariant::U8(v) => v.get(index).map(|&x| x as f64),
            DataVariant::U16(v) => v.get(index).map(|&x| x as f64),
            DataVariant::U32(v) => v.get(index).map(|&x| x as f64),
            DataVariant::I32(v) => v.get(index).map(|&x| x as f64),
            DataVariant::ComplexF32(v) => v
                .get(index)
                .map(|c| ((c[0] as f64).powi(2) + (c[1] as f64).powi(2)).sqrt()),
            DataVariant::ComplexF64(v) => {
                v.get(index).map(|c| (c[0].powi(2) + c[1].powi(2)).sqrt())
            }
        }
    }

    /// Copy this variant's contents into `output`, preserving the output's
    /// kind. Same-kind copies are element-for-element; cross-kind copies go
    /// through `f64` (complex collapses to magnitude, imaginary parts of the
    /// destination are zeroed).
    pub fn copy_into(&self, output: &mut DataVariant) {
        macro_rules! same_kind {
            ($src:expr, $dst:expr) => {{
                $dst.clear();
                $dst.extend_from_slice($src);
                return;
            }};
        }
        match (self, &mut *output) {
            (DataVariant::F64(s), DataVariant::F64(d)) => same_kind!(s, d),
            (DataVariant::F32(s), DataVariant::F32(d)) => same_kind!(s, d),
            (DataVariant::U8(s), DataVariant::U8(d)) => same_kind!(s, d),
            (DataVariant::U16(s), DataVariant::U16(d)) => same_kind!(s, d),
            (DataVariant::U32(s), DataVariant::U32(d)) => same_kind!(s, d),
            (DataVariant::I32(s), DataVariant::I32(d)) => same_kind!(s, d),
            (DataVariant::ComplexF32(s), DataVariant::ComplexF32(d)) => same_kind!(s, d),
            (DataVariant::ComplexF64(s), DataVariant::ComplexF64(d)) => same_kind!(s, d),
            _ => {}
        }
        let samples = self.as_f64_vec();
        *output = match output {
            DataVariant::F64(_) => DataVariant::F64(samples),
            DataVariant::F32(_) => DataVariant::F32(samples.iter().map(|&x| x as f32).collect()),
            DataVariant::U8(_) => DataVariant::U8(samples.iter().map(|&x| x as u8).collect()),
            DataVariant::U16(_) => DataVariant::U16(samples.iter().map(|&x| x as u16).collect()),
            DataVariant::U32(_) => DataVariant::U32(samples.iter().map(|&x| x as u32).collect()),
            DataVariant::I32(_) => DataVariant::I32(samples.iter().map(|&x| x as i32).collect()),
            DataVariant::ComplexF32(_) => DataVariant::ComplexF32(
                samples.iter().map(|&x| [x as f32, 0.0]).collect(),
            ),
            DataVariant::ComplexF64(_) => {
                DataVariant::ComplexF64(samples.iter().map(|&x| [x, 0.0]).collect())
            }
        };
    }

    /// Append another variant's elements. Mismatched kinds are dropped.
    pub fn extend_from(&mut self, other: &DataVariant) {
        match (self, other) {
            (DataVariant::F64(d), DataVariant::F64(s)) => d.extend_from_slice(s),
            (DataVariant::F32(d), DataVariant::F32(s)) => d.extend_from_slice(s),
            (DataVariant::U8(d), DataVariant::U8(s)) => d.extend_from_slice(s),
            (DataVariant::U16(d), DataVariant::U16(s)) => d.extend_from_slice(s),
            (DataVariant::U32(d), DataVariant::U32(s)) => d.extend_from_slice(s),
            (DataVariant::I32(d), DataVariant::I32(s)) => d.extend_from_slice(s),
            (DataVariant::ComplexF32(d), DataVariant::ComplexF32(s)) => d.extend_from_slice(s),
            (DataVariant::ComplexF64(d), DataVariant::ComplexF64(s)) => d.extend_from_slice(s),
            _ => {}
        }
    }

    /// Copy up to `output.len()` samples into a `f64` slice, zero-padding
    /// the tail when this variant is shorter.
    pub fn copy_to_f64_slice(&self, output: &mut [f64]) {
        let samples = self.as_f64_vec();
        let n = samples.len().min(output.len());
        output[..n].copy_from_slice(&samples[..n]);
        for slot in &mut output[n..] {
            *slot = 0.0;
        }
    }
}

impl From<Vec<f64>> for DataVariant {
    fn from(v: Vec<f64>) -> Self {
        DataVariant::F64(v)
    }
}

impl From<Vec<f32>> for DataVariant {
    fn from(v: Vec<f32>) -> Self {
        DataVariant::F32(v)
    }
}

/// Walks every linear index covered by a region, in odometer order
/// (last dimension varies fastest, matching row-major layout).
struct RegionWalker<'a> {
    region: &'a Region,
    dimensions: &'a [DataDimension],
    current: Vec<u64>,
    done: bool,
}

impl<'a> RegionWalker<'a> {
    fn new(region: &'a Region, dimensions: &'a [DataDimension]) -> Self {
        Self {
            region,
            dimensions,
            current: region.start_coordinates.clone(),
            done: region.start_coordinates.is_empty() || region.get_volume() == 0,
        }
    }
}

impl Iterator for RegionWalker<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.done {
            return None;
        }
        let index = coordinates_to_linear(&self.current, self.dimensions);
        // Odometer increment: bump the last dimension, carry leftward.
        let mut carried = true;
        for dim in (0..self.current.len()).rev() {
            if self.current[dim] < self.region.end_coordinates[dim] {
                self.current[dim] += 1;
                carried = false;
                break;
            }
            self.current[dim] = self.region.start_coordinates[dim];
        }
        if carried {
            self.done = true;
        }
        Some(index)
    }
}

/// Validate that a region is well-formed and lies within the given
/// dimensions.
pub fn validate_region(region: &Region, dimensions: &[DataDimension]) -> Result<()> {
    if region.start_coordinates.len() != region.end_coordinates.len() {
        return Err(EngineError::CoordinateArityMismatch {
            got: region.end_coordinates.len(),
            expected: region.start_coordinates.len(),
        });
    }
    if region.rank() != dimensions.len() {
        return Err(EngineError::RankMismatch {
            requested: region.rank(),
            available: dimensions.len(),
        });
    }
    for (i, dim) in dimensions.iter().enumerate() {
        if region.end_coordinates[i] >= dim.size {
            return Err(EngineError::RegionOutOfBounds {
                dimension: i,
                end: region.end_coordinates[i],
                size: dim.size,
            });
        }
    }
    Ok(())
}

/// Extract the data covered by `region` from flat storage.
///
/// The result preserves the source sample type. Out-of-bounds regions are
/// an error; callers wanting zero-fill or wraparound handle that above
/// this function.
pub fn extract_region_data(
    source: &DataVariant,
    region: &Region,
    dimensions: &[DataDimension],
) -> Result<DataVariant> {
    validate_region(region, dimensions)?;
    let mut result = source.zeroed_like(0);
    with_variant_pair!(source, &mut result, src, dst => {
        dst.reserve(region.get_volume() as usize);
        for index in RegionWalker::new(region, dimensions) {
            // validate_region bounds the walk, but storage may be shorter
            // than the declared shape for streams still filling up.
            if let Some(value) = src.get(index as usize) {
                dst.push(*value);
            }
        }
    }, _ => unreachable!("zeroed_like preserves kind"));
    Ok(result)
}

/// Write `source` into the part of `dest` covered by `region`.
///
/// Stops early when either the source or the region is exhausted.
pub fn write_region_data(
    dest: &mut DataVariant,
    source: &DataVariant,
    region: &Region,
    dimensions: &[DataDimension],
) -> Result<()> {
    validate_region(region, dimensions)?;
    if dest.kind() != source.kind() {
        return Err(EngineError::TypeMismatch {
            expected: dest.kind(),
            got: source.kind(),
        });
    }
    with_variant_pair!(dest, source, dst, src => {
        let mut source_index = 0usize;
        for index in RegionWalker::new(region, dimensions) {
            if source_index >= src.len() {
                break;
            }
            if let Some(slot) = dst.get_mut(index as usize) {
                *slot = src[source_index];
            }
            source_index += 1;
        }
    }, _ => {});
    Ok(())
}

/// Interleave per-channel vectors into a single vector (LRLR for stereo).
pub fn interleave_channels<T: Copy>(channels: &[Vec<T>]) -> Vec<T> {
    let Some(first) = channels.first() else {
        return Vec::new();
    };
    let num_channels = channels.len();
    let samples_per_channel = first.len();
    let mut result = Vec::with_capacity(num_channels * samples_per_channel);
    for i in 0..samples_per_channel {
        for channel in channels {
            if let Some(&value) = channel.get(i) {
                result.push(value);
            }
        }
    }
    result
}

/// Split an interleaved vector into per-channel vectors.
pub fn deinterleave_channels<T: Copy>(interleaved: &[T], num_channels: usize) -> Vec<Vec<T>> {
    if interleaved.is_empty() || num_channels == 0 {
        return Vec::new();
    }
    let samples_per_channel = interleaved.len() / num_channels;
    let mut result = vec![Vec::with_capacity(samples_per_channel); num_channels];
    for i in 0..samples_per_channel {
        for (ch, out) in result.iter_mut().enumerate() {
            out.push(interleaved[i * num_channels + ch]);
        }
    }
    result
}

/// Extract one frame's worth of elements from flat storage.
pub fn extract_frame<T: Clone>(data: &[T], frame_index: u64, frame_size: u64) -> Vec<T> {
    let start = (frame_index * frame_size) as usize;
    let end = (start + frame_size as usize).min(data.len());
    if start >= data.len() {
        return Vec::new();
    }
    data[start..end].to_vec()
}
