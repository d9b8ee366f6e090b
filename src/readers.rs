//! Dimension-keyed consumption barrier
//!
//! Lets N decoupled consumers each drain one processed generation before
//! the producer starts the next, without the producer knowing ahead of
//! time how many consumers exist. Interest is keyed per dimension, so two
//! readers of channel 0 and one reader of channel 1 gate independently.

use std::collections::{HashMap, HashSet};

use tracing::warn;

/// Per-generation consumption bookkeeping for dimension readers.
///
/// Owned by the container behind its own mutex; all methods assume the
/// caller holds that lock.
#[derive(Debug, Default)]
pub struct ConsumptionTracker {
    /// Expected reader count per dimension
    expected: HashMap<u32, u32>,
    /// Next reader id to allocate, scoped per dimension
    next_reader_id: HashMap<u32, u32>,
    /// Dimensions each registered reader has consumed this generation
    consumed: HashMap<u32, HashSet<u32>>,
}

impl ConsumptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new reader of `dimension` and allocate its id.
    pub fn register_dimension_reader(&mut self, dimension: u32) -> u32 {
        *self.expected.entry(dimension).or_insert(0) += 1;
        let next = self.next_reader_id.entry(dimension).or_insert(0);
        let reader_id = *next;
        *next += 1;
        self.consumed.entry(reader_id).or_default();
        reader_id
    }

    /// Drop one reader of `dimension`.
    ///
    /// When the last reader leaves, the dimension stops gating the barrier
    /// and its id counter resets.
    pub fn unregister_dimension_reader(&mut self, dimension: u32) {
        if let Some(count) = self.expected.get_mut(&dimension) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.expected.remove(&dimension);
                self.next_reader_id.remove(&dimension);
            }
        }
    }

    /// Record that `reader_id` has consumed `dimension` this generation.
    ///
    /// Unknown reader ids are a caller bug; they are logged and dropped
    /// rather than crashing the processing path.
    pub fn mark_dimension_consumed(&mut self, dimension: u32, reader_id: u32) {
        match self.consumed.get_mut(&reader_id) {
            Some(dims) => {
                dims.insert(dimension);
            }
            None => {
                warn!(reader_id, dimension, "consumption marked by unregistered reader, ignoring");
            }
        }
    }

    /// True once every active dimension has been consumed by at least as
    /// many distinct readers as are registered for it.
    pub fn all_dimensions_consumed(&self) -> bool {
        self.expected.iter().all(|(&dimension, &expected)| {
            let consumers = self
                .consumed
                .values()
                .filter(|dims| dims.contains(&dimension))
                .count() as u32;
            consumers >= expected
        })
    }

    /// Start a new generation: forget every reader's consumed set.
    pub fn clear_all_consumption(&mut self) {
        for dims in self.consumed.values_mut() {
            dims.clear();
        }
    }

    /// True while any dimension has registered readers.
    pub fn has_active_readers(&self) -> bool {
        !self.expected.is_empty()
    }

    /// Expected reader count for one dimension.
    pub fn expected_readers(&self, dimension: u32) -> u32 {
        self.expected.get(&dimension).copied().unwrap_or(0)
    }
}
