//! Error types for the signal-data engine

/// Errors that can occur while configuring or driving containers and processors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Output shape rank does not match the container's dimension count
    #[error("Shape rank mismatch: requested {requested} dimensions, container has {available}")]
    RankMismatch { requested: usize, available: usize },

    /// A requested dimension size was zero
    #[error("Zero-size dimension at index {0}")]
    ZeroSizeDimension(usize),

    /// A requested size exceeds the container's extent along a dimension
    #[error("Requested {requested} elements exceeds available {available} along dimension {dimension}")]
    ExtentExceeded {
        dimension: usize,
        requested: u64,
        available: u64,
    },

    /// A region reaches outside the container's data
    #[error("Region out of bounds along dimension {dimension}: end {end} >= size {size}")]
    RegionOutOfBounds { dimension: usize, end: u64, size: u64 },

    /// Coordinate arity does not match the container's dimension count
    #[error("Coordinate arity mismatch: got {got} coordinates, expected {expected}")]
    CoordinateArityMismatch { got: usize, expected: usize },

    /// A channel index outside the container's channel count
    #[error("Channel index {index} exceeds channel count {channels}")]
    ChannelOutOfRange { index: u32, channels: u32 },

    /// Data payload length does not match the container's shape
    #[error("Data length mismatch: got {got} elements, expected {expected}")]
    DataLengthMismatch { got: usize, expected: usize },

    /// A typed operation met a variant of a different sample type
    #[error("Sample type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// The container cannot serve the request in its current state
    #[error("Container not ready for processing (state: {0})")]
    NotReady(&'static str),

    /// A processor was used before a successful attach
    #[error("Processor not prepared: {0}")]
    NotPrepared(&'static str),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
