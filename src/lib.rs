//! # ndsignal - Real-Time N-Dimensional Signal Data Engine
//!
//! ndsignal owns multi-dimensional sample data and coordinates its flow
//! between producers (file/stream loaders), processors, and real-time
//! consumers.
//!
//! ## Overview
//!
//! The engine is built around a few cooperating pieces:
//! - **Containers**: [`SignalSourceContainer`] owns typed sample storage
//!   with dimension metadata, a validated processing-state machine, and a
//!   loop-aware stream cursor
//! - **Regions**: inclusive N-dimensional coordinate boxes with typed
//!   attributes, grouped, segmented, and LRU-cached
//! - **Processors**: [`ContiguousAccessProcessor`] walks container frames
//!   in windows and fills the processed slot each generation
//! - **Adapters**: [`ContainerToBufferAdapter`] bridges one channel to a
//!   fixed-size output buffer and drives the cycle from the consumer side
//! - **Reader barrier**: a dimension-keyed rendezvous so a generation is
//!   only retired once every registered consumer has drained it
//!
//! ## Quick Start
//!
//! ```rust
//! use ndsignal::{ContainerBuffer, ContainerConfig, SignalSourceContainer};
//! use ndsignal::data::DataVariant;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Two channels, four frames, interleaved samples
//!     let container = SignalSourceContainer::new(
//!         ContainerConfig::new()
//!             .with_channels(2)
//!             .with_frames(4)
//!             .with_buffer_size(4),
//!     );
//!     container.set_raw_data(
//!         0,
//!         DataVariant::F64(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]),
//!     )?;
//!     container.create_default_processor()?;
//!
//!     // One consumer per channel; the first to run drives processing
//!     let mut left = ContainerBuffer::new(container.clone(), 0)?;
//!     let mut right = ContainerBuffer::new(container.clone(), 1)?;
//!     left.process();
//!     right.process();
//!
//!     assert_eq!(left.samples(), vec![0.1, 0.3, 0.5, 0.7]);
//!     assert_eq!(right.samples(), vec![0.2, 0.4, 0.6, 0.8]);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! One real-time thread drives adapters while control threads mutate
//! container contents; coordination is lock- and atomic-based, with no
//! async runtime. Container interiors sit behind re-entrant mutexes so
//! state callbacks fired under the lock can re-enter read paths, and the
//! region cache degrades contended lookups to misses instead of blocking
//! the render thread.
//!
//! ## Features
//!
//! - **`serde`**: serialization for regions, groups, and dimension
//!   metadata

pub mod adapter;
pub mod container;
pub mod data;
pub mod dimension;
pub mod error;
pub mod processor;
pub mod readers;
pub mod region;
pub mod state;

pub use adapter::{AudioBuffer, ContainerBuffer, ContainerToBufferAdapter};
pub use container::{ContainerConfig, SharedAudioBuffer, SignalSourceContainer};
pub use data::DataVariant;
pub use dimension::{DataDimension, DimensionRole, MemoryLayout, OrganizationStrategy};
pub use error::{EngineError, Result};
pub use processor::{ContiguousAccessProcessor, DataProcessor, ProcessingChain};
pub use readers::ConsumptionTracker;
pub use region::{
    Region, RegionCache, RegionCacheManager, RegionGroup, RegionSegment,
    RegionSelectionPattern, RegionState, RegionTransition,
};
pub use state::{transition_state, ProcessingState, StateCallback};
