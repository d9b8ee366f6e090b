//! Signal source containers
//!
//! A [`SignalSourceContainer`] owns N-dimensional sample data plus
//! everything needed to drive it through processing cycles: a validated
//! state machine, a dimension-keyed reader barrier, a loop-aware stream
//! cursor, region groups, a default processor and a processing chain.
//!
//! ## Locking
//!
//! The container interior sits behind a re-entrant mutex so a state
//! callback fired under the lock may call back into read paths. Hot-path
//! values (`ProcessingState`, the processing token) are atomics readable
//! without the lock; compound mutations take it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, warn};

use crate::data::{extract_region_data, interleave_channels, write_region_data, DataVariant};
use crate::dimension::{
    frame_size, total_elements, DataDimension, MemoryLayout, OrganizationStrategy,
};
use crate::error::{EngineError, Result};
use crate::processor::{advance_frame_position, ContiguousAccessProcessor, DataProcessor, ProcessingChain};
use crate::readers::ConsumptionTracker;
use crate::region::{Region, RegionGroup};
use crate::state::{transition_state, ProcessingState, StateCallback};

/// Shared handle to one channel's output buffer.
pub type SharedAudioBuffer = Arc<Mutex<crate::adapter::AudioBuffer>>;

/// Construction parameters for a container.
#[derive(Clone, Debug)]
pub struct ContainerConfig {
    pub sample_rate: f64,
    pub channels: u32,
    pub frames: u64,
    pub organization: OrganizationStrategy,
    pub layout: MemoryLayout,
    pub looping: bool,
    /// Size of lazily created channel buffers, in samples
    pub buffer_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            channels: 2,
            frames: 0,
            organization: OrganizationStrategy::Interleaved,
            layout: MemoryLayout::RowMajor,
            looping: false,
            buffer_size: 512,
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_organization(mut self, organization: OrganizationStrategy) -> Self {
        self.organization = organization;
        self
    }

    pub fn with_layout(mut self, layout: MemoryLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

struct Inner {
    dimensions: Vec<DataDimension>,
    sample_rate: f64,
    num_frames: u64,
    num_channels: u32,
    organization: OrganizationStrategy,
    layout: MemoryLayout,
    buffer_size: usize,

    /// Raw payloads: one per channel when planar, a single interleaved
    /// payload otherwise
    data: Vec<DataVariant>,
    /// Processed slot, always planar per-channel
    processed: Vec<DataVariant>,

    /// Per-channel stream cursor, in frames
    read_position: Vec<u64>,
    looping: bool,
    loop_region: Region,

    region_groups: HashMap<String, RegionGroup>,
    buffers: HashMap<u32, SharedAudioBuffer>,
}

/// Opaque guard over a container's interior lock.
///
/// Lets adapters bracket multi-step read-modify sequences; the lock is
/// re-entrant, so container methods may still be called while held.
pub struct ContainerGuard<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<Inner>>,
}

/// N-dimensional sample container with validated processing lifecycle.
pub struct SignalSourceContainer {
    inner: ReentrantMutex<RefCell<Inner>>,
    state: AtomicU8,
    /// Channel currently elected to drive processing; -1 = free
    processing_token: AtomicI32,
    tracker: Mutex<ConsumptionTracker>,
    state_callback: Mutex<Option<StateCallback>>,
    default_processor: Mutex<Option<Box<dyn DataProcessor>>>,
    processing_chain: Mutex<ProcessingChain>,
}

impl SignalSourceContainer {
    /// Create a container from a config. When `frames > 0` the shape is
    /// set up immediately; otherwise call [`setup`](Self::setup) later.
    pub fn new(config: ContainerConfig) -> Arc<Self> {
        let container = Arc::new(Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                dimensions: Vec::new(),
                sample_rate: config.sample_rate,
                num_frames: 0,
                num_channels: config.channels,
                organization: config.organization,
                layout: config.layout,
                buffer_size: config.buffer_size,
                data: Vec::new(),
                processed: Vec::new(),
                read_position: vec![0; config.channels as usize],
                looping: config.looping,
                loop_region: Region::default(),
                region_groups: HashMap::new(),
                buffers: HashMap::new(),
            })),
            state: AtomicU8::new(ProcessingState::Idle.as_u8()),
            processing_token: AtomicI32::new(-1),
            tracker: Mutex::new(ConsumptionTracker::new()),
            state_callback: Mutex::new(None),
            default_processor: Mutex::new(None),
            processing_chain: Mutex::new(ProcessingChain::new()),
        });
        if config.frames > 0 {
            container.setup(config.frames, config.sample_rate, config.channels);
        }
        container
    }

    /// Define the container's shape. Existing data is dropped.
    pub fn setup(&self, frames: u64, sample_rate: f64, channels: u32) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.num_frames = frames;
        inner.sample_rate = sample_rate;
        inner.num_channels = channels;
        inner.dimensions = vec![
            DataDimension::time(frames),
            DataDimension::channel(channels as u64),
        ];
        inner.data.clear();
        inner.processed.clear();
        inner.read_position = vec![0; channels as usize];
        drop(inner);
        self.state.store(ProcessingState::Idle.as_u8(), Ordering::SeqCst);
        debug!(frames, sample_rate, channels, "container shape configured");
    }

    // ---- shape and metadata ----------------------------------------

    pub fn dimensions(&self) -> Vec<DataDimension> {
        self.inner.lock().borrow().dimensions.clone()
    }

    pub fn total_elements(&self) -> u64 {
        total_elements(&self.inner.lock().borrow().dimensions)
    }

    pub fn frame_size(&self) -> u64 {
        frame_size(&self.inner.lock().borrow().dimensions)
    }

    pub fn num_frames(&self) -> u64 {
        self.inner.lock().borrow().num_frames
    }

    pub fn channels(&self) -> u32 {
        self.inner.lock().borrow().num_channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.lock().borrow().sample_rate
    }

    pub fn organization(&self) -> OrganizationStrategy {
        self.inner.lock().borrow().organization
    }

    pub fn memory_layout(&self) -> MemoryLayout {
        self.inner.lock().borrow().layout
    }

    // ---- raw data --------------------------------------------------

    /// Install one channel's payload (planar) or the single interleaved
    /// payload (interleaved organization, `channel` must be 0).
    pub fn set_raw_data(&self, channel: u32, data: DataVariant) -> Result<()> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        match inner.organization {
            OrganizationStrategy::Interleaved => {
                if channel != 0 {
                    return Err(EngineError::ChannelOutOfRange {
                        index: channel,
                        channels: 1,
                    });
                }
                let expected = (inner.num_frames * inner.num_channels as u64) as usize;
                if data.len() != expected {
                    return Err(EngineError::DataLengthMismatch {
                        got: data.len(),
                        expected,
                    });
                }
                inner.data = vec![data];
            }
            OrganizationStrategy::Planar => {
                if channel >= inner.num_channels {
                    return Err(EngineError::ChannelOutOfRange {
                        index: channel,
                        channels: inner.num_channels,
                    });
                }
                if data.len() != inner.num_frames as usize {
                    return Err(EngineError::DataLengthMismatch {
                        got: data.len(),
                        expected: inner.num_frames as usize,
                    });
                }
                if inner.data.len() != inner.num_channels as usize {
                    let template = data.zeroed_like(inner.num_frames as usize);
                    inner.data = vec![template; inner.num_channels as usize];
                }
                inner.data[channel as usize] = data;
            }
        }
        Ok(())
    }

    /// Install every channel payload at once.
    pub fn set_all_raw_data(&self, data: Vec<DataVariant>) -> Result<()> {
        let organization = self.organization();
        match organization {
            OrganizationStrategy::Interleaved => {
                let mut iter = data.into_iter();
                match iter.next() {
                    Some(payload) => self.set_raw_data(0, payload),
                    None => Err(EngineError::DataLengthMismatch { got: 0, expected: 1 }),
                }
            }
            OrganizationStrategy::Planar => {
                for (channel, payload) in data.into_iter().enumerate() {
                    self.set_raw_data(channel as u32, payload)?;
                }
                Ok(())
            }
        }
    }

    pub fn has_data(&self) -> bool {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        !inner.data.is_empty() && inner.data.iter().any(|d| !d.is_empty())
    }

    /// Drop all data and processed results and return to idle, keeping
    /// the configured shape.
    pub fn clear(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.data.clear();
        inner.processed.clear();
        for pos in &mut inner.read_position {
            *pos = 0;
        }
        drop(inner);
        drop(guard);
        self.state.store(ProcessingState::Idle.as_u8(), Ordering::SeqCst);
        self.tracker.lock().clear_all_consumption();
        self.reset_processing_token();
    }

    /// One channel's samples, type-preserving.
    pub fn get_raw_samples(&self, channel: u32) -> Result<DataVariant> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        if channel >= inner.num_channels {
            return Err(EngineError::ChannelOutOfRange {
                index: channel,
                channels: inner.num_channels,
            });
        }
        if inner.num_frames == 0 {
            return Err(EngineError::NotReady("no data"));
        }
        let region = Region::span(
            vec![0, channel as u64],
            vec![inner.num_frames - 1, channel as u64],
        );
        inner.extract_channels(&region).map(|mut parts| parts.remove(0))
    }

    // ---- region data -----------------------------------------------

    /// Extract the data covered by `region`, one planar payload per
    /// channel in the region's channel span. Interleaved sources are
    /// deinterleaved on the way out.
    pub fn get_region_data(&self, region: &Region) -> Result<Vec<DataVariant>> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.extract_channels(region)
    }

    /// Write planar per-channel payloads into the part of the raw data
    /// covered by `region`.
    pub fn set_region_data(&self, region: &Region, parts: &[DataVariant]) -> Result<()> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.write_channels(region, parts)
    }

    /// Sample at `[frame, channel]`, converted to `f64`.
    ///
    /// Out-of-range coordinates degrade to 0.0 rather than erroring, so
    /// render paths can over-read safely.
    pub fn get_value_at(&self, coordinates: &[u64]) -> f64 {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.value_at(coordinates).unwrap_or(0.0)
    }

    /// Overwrite the sample at `[frame, channel]`. Out-of-range writes
    /// are dropped.
    pub fn set_value_at(&self, coordinates: &[u64], value: f64) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.set_value(coordinates, value);
    }

    /// Copy interleaved frames `[start, start+count)` into `output`,
    /// zero-filling anything past the end of the data. Looping containers
    /// wrap frame indices inside the loop region instead of running out.
    pub fn get_frames(&self, output: &mut [f64], start_frame: u64, num_frames: u64) {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        output.fill(0.0);
        if output.is_empty() {
            return;
        }
        let interleaved = inner.interleaved_samples();
        let channels = inner.num_channels as u64;

        if inner.looping {
            if let Some((loop_start, loop_end)) = inner.loop_bounds() {
                if loop_end >= loop_start {
                    let loop_len = loop_end - loop_start + 1;
                    let elements = (num_frames * channels).min(output.len() as u64);
                    for i in 0..elements {
                        let frame = start_frame + i / channels;
                        let channel = i % channels;
                        let wrapped = if frame < loop_start {
                            frame
                        } else {
                            loop_start + (frame - loop_start) % loop_len
                        };
                        let index = (wrapped * channels + channel) as usize;
                        output[i as usize] = interleaved.get(index).copied().unwrap_or(0.0);
                    }
                    return;
                }
            }
        }

        if start_frame >= inner.num_frames {
            return;
        }
        let frames_to_copy = num_frames.min(inner.num_frames - start_frame);
        let elements = (frames_to_copy * channels).min(output.len() as u64) as usize;
        let offset = (start_frame * channels) as usize;
        if offset < interleaved.len() {
            let available = elements.min(interleaved.len() - offset);
            output[..available].copy_from_slice(&interleaved[offset..offset + available]);
        }
    }

    /// A zero-filled payload matching the stored sample kind; `f64`
    /// zeros when no data is installed yet.
    pub fn zeroed_payload(&self, len: usize) -> DataVariant {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner
            .data
            .first()
            .map(|d| d.zeroed_like(len))
            .unwrap_or_else(|| DataVariant::F64(vec![0.0; len]))
    }

    /// The processed slot, one planar payload per channel.
    pub fn get_processed_data(&self) -> Vec<DataVariant> {
        self.inner.lock().borrow().processed.clone()
    }

    /// Replace the processed slot.
    pub fn set_processed_data(&self, processed: Vec<DataVariant>) {
        self.inner.lock().borrow_mut().processed = processed;
    }

    // ---- stream surface --------------------------------------------

    pub fn read_position(&self, channel: u32) -> u64 {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.read_position.get(channel as usize).copied().unwrap_or(0)
    }

    pub fn read_positions(&self) -> Vec<u64> {
        self.inner.lock().borrow().read_position.clone()
    }

    pub fn set_read_position(&self, positions: &[u64]) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let n = positions.len().min(inner.read_position.len());
        inner.read_position[..n].copy_from_slice(&positions[..n]);
    }

    pub fn set_read_position_for_channel(&self, channel: u32, frame: u64) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(pos) = inner.read_position.get_mut(channel as usize) {
            *pos = frame;
        }
    }

    /// Advance each channel's cursor, wrapping inside the loop region
    /// when looping and saturating at the total extent otherwise.
    pub fn advance_read_position(&self, frames: &[u64]) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let total = inner.num_frames;
        let looping = inner.looping;
        let loop_bounds = inner.loop_bounds();
        for (i, pos) in inner.read_position.iter_mut().enumerate() {
            let amount = frames.get(i).copied().unwrap_or(0);
            *pos = advance_frame_position(*pos, amount, total, loop_bounds, looping);
        }
    }

    /// True when the stream has run out; looping streams never end.
    pub fn is_at_end(&self) -> bool {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        if inner.looping {
            return false;
        }
        match inner.read_position.first() {
            Some(&frame) => frame >= inner.num_frames,
            None => true,
        }
    }

    /// Rewind every channel cursor, to the loop start when looping.
    pub fn reset_read_position(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let start = if inner.looping {
            inner.loop_region.start_coordinates.first().copied().unwrap_or(0)
        } else {
            0
        };
        for pos in &mut inner.read_position {
            *pos = start;
        }
    }

    /// Frames left per channel; `u64::MAX` for looping streams.
    pub fn remaining_frames(&self) -> Vec<u64> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        if inner.looping {
            return vec![u64::MAX; inner.num_channels as usize];
        }
        inner
            .read_position
            .iter()
            .map(|&pos| inner.num_frames.saturating_sub(pos))
            .collect()
    }

    /// Copy interleaved samples from the cursor without advancing it.
    ///
    /// Returns the number of elements written. Looping streams wrap
    /// frame indices inside the loop region.
    pub fn peek_sequential(&self, output: &mut [f64], count: u64, frame_offset: u64) -> u64 {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let interleaved = inner.interleaved_samples();
        if interleaved.is_empty() || output.is_empty() {
            output.fill(0.0);
            return 0;
        }
        let channels = inner.num_channels as u64;
        let start_frame = inner.read_position.first().copied().unwrap_or(0) + frame_offset;
        let elements = count.min(output.len() as u64);

        if !inner.looping {
            output.fill(0.0);
            let linear_start = (start_frame * channels) as usize;
            if linear_start >= interleaved.len() {
                return 0;
            }
            let available = (elements as usize).min(interleaved.len() - linear_start);
            output[..available].copy_from_slice(&interleaved[linear_start..linear_start + available]);
            return available as u64;
        }

        let Some((loop_start, loop_end)) = inner.loop_bounds() else {
            output.fill(0.0);
            return 0;
        };
        let loop_len = loop_end - loop_start + 1;
        for i in 0..elements {
            let element = start_frame * channels + i;
            let frame = element / channels;
            let channel = element % channels;
            let wrapped = if frame < loop_start {
                frame
            } else {
                loop_start + (frame - loop_start) % loop_len
            };
            let index = (wrapped * channels + channel) as usize;
            output[i as usize] = interleaved.get(index).copied().unwrap_or(0.0);
        }
        for slot in &mut output[elements as usize..] {
            *slot = 0.0;
        }
        elements
    }

    /// [`peek_sequential`](Self::peek_sequential) followed by a loop-aware
    /// cursor advance of the frames actually read.
    pub fn read_sequential(&self, output: &mut [f64], count: u64) -> u64 {
        let elements_read = self.peek_sequential(output, count, 0);
        let channels = self.channels().max(1) as u64;
        let frames_read = elements_read / channels;
        let advance = vec![frames_read; channels as usize];
        self.advance_read_position(&advance);
        elements_read
    }

    pub fn time_to_position(&self, time: f64) -> u64 {
        (time * self.sample_rate()) as u64
    }

    pub fn position_to_time(&self, position: u64) -> f64 {
        position as f64 / self.sample_rate()
    }

    // ---- looping ---------------------------------------------------

    pub fn set_looping(&self, enable: bool) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.looping = enable;
        if enable && inner.loop_region.start_coordinates.is_empty() && inner.num_frames > 0 {
            inner.loop_region = Region::time_span(0, inner.num_frames - 1, "");
        }
    }

    pub fn is_looping(&self) -> bool {
        self.inner.lock().borrow().looping
    }

    /// Install a loop region; a looping cursor outside it snaps to its start.
    pub fn set_loop_region(&self, region: Region) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.loop_region = region;
        if !inner.looping || inner.loop_region.start_coordinates.is_empty() {
            return;
        }
        let start = inner.loop_region.start_coordinates[0];
        let end = inner.loop_region.end_coordinates[0];
        let outside = inner
            .read_position
            .iter()
            .any(|&pos| pos < start || pos > end);
        if outside {
            for pos in &mut inner.read_position {
                *pos = start;
            }
        }
    }

    pub fn loop_region(&self) -> Region {
        self.inner.lock().borrow().loop_region.clone()
    }

    // ---- state machine ---------------------------------------------

    pub fn processing_state(&self) -> ProcessingState {
        ProcessingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Request a state transition.
    ///
    /// Edges not in the transition table are rejected (logged, `false`),
    /// with one exception: any state may move to `NeedsRemoval`, the
    /// removal override for containers being torn down. Side effects on
    /// success: entering `Ready` resets the consumption barrier; entering
    /// `NeedsRemoval` marks every attached buffer for removal; the state
    /// callback fires under the container lock.
    pub fn update_processing_state(self: &Arc<Self>, new_state: ProcessingState) -> bool {
        let current = self.processing_state();
        if new_state != ProcessingState::NeedsRemoval && !transition_state(current, new_state) {
            warn!(
                from = current.as_str(),
                to = new_state.as_str(),
                "rejected invalid state transition"
            );
            return false;
        }
        if current == new_state {
            return true;
        }
        self.state.store(new_state.as_u8(), Ordering::SeqCst);

        if new_state == ProcessingState::Ready {
            self.tracker.lock().clear_all_consumption();
        }
        if new_state == ProcessingState::NeedsRemoval {
            self.mark_buffers_for_removal();
        }

        let guard = self.inner.lock();
        if let Some(callback) = self.state_callback.lock().as_ref() {
            callback(self, new_state);
        }
        drop(guard);
        true
    }

    /// Install the state-change callback (a single slot; replaces any
    /// previous one). The callback runs under the container lock and must
    /// not re-register callbacks from within itself.
    pub fn register_state_change_callback(&self, callback: StateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    pub fn unregister_state_change_callback(&self) {
        *self.state_callback.lock() = None;
    }

    /// Has data and is in a consumable state.
    pub fn is_ready_for_processing(&self) -> bool {
        let state = self.processing_state();
        self.has_data()
            && matches!(state, ProcessingState::Ready | ProcessingState::Processed)
    }

    pub fn mark_ready_for_processing(self: &Arc<Self>, ready: bool) {
        if ready && self.has_data() {
            self.update_processing_state(ProcessingState::Ready);
        } else if !ready {
            self.update_processing_state(ProcessingState::Idle);
        }
    }

    // ---- reader barrier --------------------------------------------

    pub fn register_dimension_reader(&self, dimension: u32) -> u32 {
        self.tracker.lock().register_dimension_reader(dimension)
    }

    pub fn unregister_dimension_reader(&self, dimension: u32) {
        self.tracker.lock().unregister_dimension_reader(dimension);
    }

    pub fn has_active_readers(&self) -> bool {
        self.tracker.lock().has_active_readers()
    }

    pub fn mark_dimension_consumed(&self, dimension: u32, reader_id: u32) {
        self.tracker.lock().mark_dimension_consumed(dimension, reader_id);
    }

    pub fn all_dimensions_consumed(&self) -> bool {
        self.tracker.lock().all_dimensions_consumed()
    }

    pub fn clear_all_consumption(&self) {
        self.tracker.lock().clear_all_consumption();
    }

    // ---- processors ------------------------------------------------

    /// Install a [`ContiguousAccessProcessor`] as the default processor
    /// and attach it, marking the container ready.
    pub fn create_default_processor(self: &Arc<Self>) -> Result<()> {
        let mut processor = ContiguousAccessProcessor::new();
        processor.on_attach(self)?;
        *self.default_processor.lock() = Some(Box::new(processor));
        Ok(())
    }

    /// Install an already-configured processor; it is attached here.
    pub fn set_default_processor(
        self: &Arc<Self>,
        mut processor: Box<dyn DataProcessor>,
    ) -> Result<()> {
        processor.on_attach(self)?;
        *self.default_processor.lock() = Some(processor);
        Ok(())
    }

    pub fn has_default_processor(&self) -> bool {
        self.default_processor.lock().is_some()
    }

    pub fn set_processing_chain(&self, chain: ProcessingChain) {
        *self.processing_chain.lock() = chain;
    }

    /// Number of stages in the installed processing chain.
    pub fn processing_chain_len(&self) -> usize {
        self.processing_chain.lock().len()
    }

    /// Run one processing generation: `Ready → Processing → Processed`,
    /// or `Error` when the processor fails. The default processor runs
    /// first, then the processing chain over its output.
    pub fn process_default(self: &Arc<Self>) -> Result<()> {
        if !self.is_ready_for_processing() {
            return Err(EngineError::NotReady(self.processing_state().as_str()));
        }
        if !self.update_processing_state(ProcessingState::Processing) {
            return Err(EngineError::NotReady(self.processing_state().as_str()));
        }

        // Taken out of its slot so the processor may call back into the
        // container without holding the slot's lock.
        let mut slot = self.default_processor.lock().take();
        let result = match slot.as_mut() {
            Some(processor) => {
                let outcome = processor.process(self);
                outcome.and_then(|()| self.processing_chain.lock().run(self))
            }
            None => Err(EngineError::NotPrepared("no default processor installed")),
        };
        if let Some(processor) = slot {
            let mut lock = self.default_processor.lock();
            if lock.is_none() {
                *lock = Some(processor);
            }
        }

        match result {
            Ok(()) => {
                self.update_processing_state(ProcessingState::Processed);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "default processing failed");
                self.update_processing_state(ProcessingState::Error);
                Err(err)
            }
        }
    }

    // ---- processing token ------------------------------------------

    /// Elect the calling channel as the one to drive processing this
    /// generation. Compare-and-swap on a free sentinel of -1.
    pub fn try_acquire_processing_token(&self, channel: i32) -> bool {
        self.processing_token
            .compare_exchange(-1, channel, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_processing_token(&self, channel: i32) -> bool {
        self.processing_token.load(Ordering::Acquire) == channel
    }

    pub fn reset_processing_token(&self) {
        self.processing_token.store(-1, Ordering::Release);
    }

    // ---- region groups ---------------------------------------------

    pub fn add_region_group(&self, group: RegionGroup) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.region_groups.insert(group.name.clone(), group);
    }

    pub fn get_region_group(&self, name: &str) -> Option<RegionGroup> {
        self.inner.lock().borrow().region_groups.get(name).cloned()
    }

    pub fn remove_region_group(&self, name: &str) -> bool {
        self.inner.lock().borrow_mut().region_groups.remove(name).is_some()
    }

    pub fn region_group_names(&self) -> Vec<String> {
        self.inner.lock().borrow().region_groups.keys().cloned().collect()
    }

    // ---- buffers ---------------------------------------------------

    /// The lazily created output buffer for one channel, sized per the
    /// container config.
    pub fn get_channel_buffer(&self, channel: u32) -> SharedAudioBuffer {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let size = inner.buffer_size;
        inner
            .buffers
            .entry(channel)
            .or_insert_with(|| {
                Arc::new(Mutex::new(crate::adapter::AudioBuffer::new(channel, size)))
            })
            .clone()
    }

    /// Buffers for every channel, creating any that don't exist yet.
    pub fn get_all_buffers(&self) -> Vec<SharedAudioBuffer> {
        let channels = self.channels();
        (0..channels).map(|ch| self.get_channel_buffer(ch)).collect()
    }

    pub fn mark_buffers_for_processing(&self, flag: bool) {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        for buffer in inner.buffers.values() {
            buffer.lock().marked_for_processing = flag;
        }
    }

    pub fn mark_buffers_for_removal(&self) {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        for buffer in inner.buffers.values() {
            buffer.lock().marked_for_removal = true;
        }
    }

    /// Hold the container's interior lock across a multi-step sequence.
    pub fn lock(&self) -> ContainerGuard<'_> {
        ContainerGuard {
            _guard: self.inner.lock(),
        }
    }
}

impl Inner {
    fn loop_bounds(&self) -> Option<(u64, u64)> {
        let start = *self.loop_region.start_coordinates.first()?;
        let end = *self.loop_region.end_coordinates.first()?;
        Some((start, end))
    }

    /// All samples as interleaved f64, regardless of organization.
    fn interleaved_samples(&self) -> Vec<f64> {
        match self.organization {
            OrganizationStrategy::Interleaved => {
                self.data.first().map(DataVariant::as_f64_vec).unwrap_or_default()
            }
            OrganizationStrategy::Planar => {
                let channels: Vec<Vec<f64>> =
                    self.data.iter().map(DataVariant::as_f64_vec).collect();
                interleave_channels(&channels)
            }
        }
    }

    fn extract_channels(&self, region: &Region) -> Result<Vec<DataVariant>> {
        if region.rank() != self.dimensions.len() {
            return Err(EngineError::RankMismatch {
                requested: region.rank(),
                available: self.dimensions.len(),
            });
        }
        if self.data.is_empty() {
            return Err(EngineError::NotReady("no data"));
        }
        let start_ch = region.start_coordinates[1];
        let end_ch = region.end_coordinates[1];
        if end_ch >= self.num_channels as u64 {
            return Err(EngineError::ChannelOutOfRange {
                index: end_ch as u32,
                channels: self.num_channels,
            });
        }
        let mut parts = Vec::with_capacity((end_ch - start_ch + 1) as usize);
        for ch in start_ch..=end_ch {
            let part = match self.organization {
                OrganizationStrategy::Interleaved => {
                    let column = Region::span(
                        vec![region.start_coordinates[0], ch],
                        vec![region.end_coordinates[0], ch],
                    );
                    extract_region_data(&self.data[0], &column, &self.dimensions)?
                }
                OrganizationStrategy::Planar => {
                    let channel_dims = vec![DataDimension::time(self.num_frames)];
                    let row = Region::span(
                        vec![region.start_coordinates[0]],
                        vec![region.end_coordinates[0]],
                    );
                    extract_region_data(&self.data[ch as usize], &row, &channel_dims)?
                }
            };
            parts.push(part);
        }
        Ok(parts)
    }

    fn write_channels(&mut self, region: &Region, parts: &[DataVariant]) -> Result<()> {
        if region.rank() != self.dimensions.len() {
            return Err(EngineError::RankMismatch {
                requested: region.rank(),
                available: self.dimensions.len(),
            });
        }
        let start_ch = region.start_coordinates[1];
        let end_ch = region.end_coordinates[1];
        if end_ch >= self.num_channels as u64 {
            return Err(EngineError::ChannelOutOfRange {
                index: end_ch as u32,
                channels: self.num_channels,
            });
        }
        let span = (end_ch - start_ch + 1) as usize;
        if parts.len() != span {
            return Err(EngineError::DataLengthMismatch {
                got: parts.len(),
                expected: span,
            });
        }
        for (offset, part) in parts.iter().enumerate() {
            let ch = start_ch + offset as u64;
            match self.organization {
                OrganizationStrategy::Interleaved => {
                    let column = Region::span(
                        vec![region.start_coordinates[0], ch],
                        vec![region.end_coordinates[0], ch],
                    );
                    let dims = self.dimensions.clone();
                    write_region_data(&mut self.data[0], part, &column, &dims)?;
                }
                OrganizationStrategy::Planar => {
                    let channel_dims = vec![DataDimension::time(self.num_frames)];
                    let row = Region::span(
                        vec![region.start_coordinates[0]],
                        vec![region.end_coordinates[0]],
                    );
                    write_region_data(&mut self.data[ch as usize], part, &row, &channel_dims)?;
                }
            }
        }
        Ok(())
    }

    fn value_at(&self, coordinates: &[u64]) -> Option<f64> {
        if coordinates.len() != 2 || self.data.is_empty() {
            return None;
        }
        let (frame, channel) = (coordinates[0], coordinates[1]);
        if frame >= self.num_frames || channel >= self.num_channels as u64 {
            return None;
        }
        match self.organization {
            OrganizationStrategy::Interleaved => {
                let index = (frame * self.num_channels as u64 + channel) as usize;
                self.data[0].value_at(index)
            }
            OrganizationStrategy::Planar => {
                self.data.get(channel as usize)?.value_at(frame as usize)
            }
        }
    }

    fn set_value(&mut self, coordinates: &[u64], value: f64) {
        if coordinates.len() != 2 || self.data.is_empty() {
            return;
        }
        let (frame, channel) = (coordinates[0], coordinates[1]);
        if frame >= self.num_frames || channel >= self.num_channels as u64 {
            return;
        }
        let (payload, index) = match self.organization {
            OrganizationStrategy::Interleaved => {
                (&mut self.data[0], (frame * self.num_channels as u64 + channel) as usize)
            }
            OrganizationStrategy::Planar => match self.data.get_mut(channel as usize) {
                Some(payload) => (payload, frame as usize),
                None => return,
            },
        };
        match payload {
            DataVariant::F64(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value;
                }
            }
            DataVariant::F32(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value as f32;
                }
            }
            DataVariant::U8(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value as u8;
                }
            }
            DataVariant::U16(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value as u16;
                }
            }
            DataVariant::U32(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value as u32;
                }
            }
            DataVariant::I32(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value as i32;
                }
            }
            DataVariant::ComplexF32(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = [value as f32, 0.0];
                }
            }
            DataVariant::ComplexF64(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = [value, 0.0];
                }
            }
        }
    }
}

/// Helper for tests and loaders: a stereo interleaved container filled
/// with the given samples.
#[cfg(test)]
pub(crate) fn interleaved_stereo(samples: Vec<f64>) -> Arc<SignalSourceContainer> {
    let frames = (samples.len() / 2) as u64;
    let container = SignalSourceContainer::new(
        ContainerConfig::new()
            .with_channels(2)
            .with_frames(frames)
            .with_buffer_size(4),
    );
    container
        .set_raw_data(0, DataVariant::F64(samples))
        .expect("payload matches shape");
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ramp8() -> Vec<f64> {
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]
    }

    #[test]
    fn setup_defines_shape() {
        let container = SignalSourceContainer::new(
            ContainerConfig::new().with_frames(4).with_channels(2),
        );
        assert_eq!(container.num_frames(), 4);
        assert_eq!(container.channels(), 2);
        assert_eq!(container.total_elements(), 8);
        assert_eq!(container.frame_size(), 2);
        assert!(!container.has_data());
    }

    #[test]
    fn raw_data_length_is_validated() {
        let container = SignalSourceContainer::new(
            ContainerConfig::new().with_frames(4).with_channels(2),
        );
        assert!(matches!(
            container.set_raw_data(0, DataVariant::F64(vec![0.0; 3])),
            Err(EngineError::DataLengthMismatch { got: 3, expected: 8 })
        ));
        assert!(container.set_raw_data(0, DataVariant::F64(ramp8())).is_ok());
        assert!(container.has_data());
    }

    #[test]
    fn planar_channels_are_separate_payloads() {
        let container = SignalSourceContainer::new(
            ContainerConfig::new()
                .with_frames(4)
                .with_channels(2)
                .with_organization(OrganizationStrategy::Planar),
        );
        container
            .set_all_raw_data(vec![
                DataVariant::F64(vec![0.1, 0.3, 0.5, 0.7]),
                DataVariant::F64(vec![0.2, 0.4, 0.6, 0.8]),
            ])
            .unwrap();
        assert_eq!(container.get_value_at(&[2, 1]), 0.6);
        assert_eq!(
            container.get_raw_samples(1).unwrap(),
            DataVariant::F64(vec![0.2, 0.4, 0.6, 0.8])
        );
    }

    #[test]
    fn region_extraction_deinterleaves() {
        let container = interleaved_stereo(ramp8());
        let parts = container
            .get_region_data(&Region::span(vec![1, 0], vec![2, 1]))
            .unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], DataVariant::F64(vec![0.3, 0.5]));
        assert_eq!(parts[1], DataVariant::F64(vec![0.4, 0.6]));
    }

    #[test]
    fn region_write_round_trips() {
        let container = interleaved_stereo(vec![0.0; 8]);
        let region = Region::span(vec![1, 0], vec![2, 1]);
        container
            .set_region_data(
                &region,
                &[
                    DataVariant::F64(vec![1.0, 2.0]),
                    DataVariant::F64(vec![3.0, 4.0]),
                ],
            )
            .unwrap();
        let parts = container.get_region_data(&region).unwrap();
        assert_eq!(parts[0], DataVariant::F64(vec![1.0, 2.0]));
        assert_eq!(parts[1], DataVariant::F64(vec![3.0, 4.0]));
    }

    #[test]
    fn value_access_degrades_to_zero() {
        let container = interleaved_stereo(ramp8());
        assert_eq!(container.get_value_at(&[1, 1]), 0.4);
        assert_eq!(container.get_value_at(&[9, 0]), 0.0);
        assert_eq!(container.get_value_at(&[0]), 0.0);

        container.set_value_at(&[1, 1], 9.0);
        assert_eq!(container.get_value_at(&[1, 1]), 9.0);
        // Out-of-range writes are dropped
        container.set_value_at(&[9, 0], 9.0);
    }

    #[test]
    fn get_frames_zero_fills_past_end() {
        let container = interleaved_stereo(ramp8());
        let mut output = [9.0; 6];
        container.get_frames(&mut output, 3, 3);
        assert_eq!(output, [0.7, 0.8, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn get_frames_wraps_when_looping() {
        let container = interleaved_stereo(ramp8());
        container.set_looping(true);
        container.set_loop_region(Region::span(vec![1, 0], vec![2, 1]));

        let mut output = [0.0; 6];
        container.get_frames(&mut output, 2, 3);
        // Frames 2, then wrapping 1, 2 inside the loop
        assert_eq!(output, [0.5, 0.6, 0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn state_transitions_are_validated() {
        let container = interleaved_stereo(ramp8());
        assert_eq!(container.processing_state(), ProcessingState::Idle);

        // Idle cannot jump straight to Processing
        assert!(!container.update_processing_state(ProcessingState::Processing));
        assert_eq!(container.processing_state(), ProcessingState::Idle);

        assert!(container.update_processing_state(ProcessingState::Ready));
        assert!(container.update_processing_state(ProcessingState::Processing));
        assert!(container.update_processing_state(ProcessingState::Processed));
        assert!(container.update_processing_state(ProcessingState::Ready));
    }

    #[test]
    fn removal_overrides_the_table() {
        let container = interleaved_stereo(ramp8());
        assert!(container.update_processing_state(ProcessingState::NeedsRemoval));
        assert_eq!(container.processing_state(), ProcessingState::NeedsRemoval);
        assert!(container.update_processing_state(ProcessingState::Idle));
    }

    #[test]
    fn entering_ready_resets_the_barrier() {
        let container = interleaved_stereo(ramp8());
        let reader = container.register_dimension_reader(0);
        container.mark_dimension_consumed(0, reader);
        assert!(container.all_dimensions_consumed());

        container.update_processing_state(ProcessingState::Ready);
        assert!(!container.all_dimensions_consumed());
    }

    #[test]
    fn state_callback_fires_on_change() {
        let container = interleaved_stereo(ramp8());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        container.register_state_change_callback(Box::new(move |c, state| {
            // Re-entering read paths under the lock must be safe
            assert!(c.has_data());
            if state == ProcessingState::Ready {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }));

        container.update_processing_state(ProcessingState::Ready);
        // Same-state no-op does not notify
        container.update_processing_state(ProcessingState::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        container.unregister_state_change_callback();
        container.update_processing_state(ProcessingState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn processing_token_is_single_winner() {
        let container = interleaved_stereo(ramp8());
        assert!(container.try_acquire_processing_token(0));
        assert!(!container.try_acquire_processing_token(1));
        assert!(container.has_processing_token(0));
        assert!(!container.has_processing_token(1));

        container.reset_processing_token();
        assert!(container.try_acquire_processing_token(1));
    }

    #[test]
    fn sequential_reads_advance_the_cursor() {
        let container = interleaved_stereo(ramp8());
        let mut output = [0.0; 4];
        assert_eq!(container.read_sequential(&mut output, 4), 4);
        assert_eq!(output, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(container.read_positions(), vec![2, 2]);

        assert_eq!(container.read_sequential(&mut output, 4), 4);
        assert_eq!(output, [0.5, 0.6, 0.7, 0.8]);
        assert!(container.is_at_end());
        assert_eq!(container.remaining_frames(), vec![0, 0]);

        // Past the end: zero-fill, nothing read
        assert_eq!(container.read_sequential(&mut output, 4), 0);
        assert_eq!(output, [0.0; 4]);
    }

    #[test]
    fn looping_reads_wrap_in_the_loop_region() {
        let container = interleaved_stereo(ramp8());
        container.set_looping(true);
        container.set_loop_region(Region::span(vec![1, 0], vec![2, 1]));
        assert!(!container.is_at_end());
        assert_eq!(container.remaining_frames(), vec![u64::MAX, u64::MAX]);

        // Cursor was at 0, outside the loop; snapped to loop start
        assert_eq!(container.read_positions(), vec![1, 1]);

        let mut output = [0.0; 8];
        container.peek_sequential(&mut output, 8, 0);
        // Frames 1,2 then wrapping back through the loop
        assert_eq!(output[..4], [0.3, 0.4, 0.5, 0.6]);
        assert_eq!(output[4..], [0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn reset_read_position_honors_loop_start() {
        let container = interleaved_stereo(ramp8());
        container.set_read_position(&[3, 3]);
        container.reset_read_position();
        assert_eq!(container.read_positions(), vec![0, 0]);

        container.set_looping(true);
        container.set_loop_region(Region::span(vec![2, 0], vec![3, 1]));
        container.set_read_position(&[3, 3]);
        container.reset_read_position();
        assert_eq!(container.read_positions(), vec![2, 2]);
    }

    #[test]
    fn time_position_conversions() {
        let container = SignalSourceContainer::new(
            ContainerConfig::new().with_sample_rate(100.0).with_frames(400),
        );
        assert_eq!(container.time_to_position(1.5), 150);
        assert_eq!(container.position_to_time(150), 1.5);
    }

    #[test]
    fn region_group_crud() {
        let container = interleaved_stereo(ramp8());
        container.add_region_group(RegionGroup::new("onsets"));
        assert!(container.get_region_group("onsets").is_some());
        assert_eq!(container.region_group_names(), vec!["onsets".to_string()]);
        assert!(container.remove_region_group("onsets"));
        assert!(!container.remove_region_group("onsets"));
    }

    #[test]
    fn clear_resets_but_keeps_shape() {
        let container = interleaved_stereo(ramp8());
        container.update_processing_state(ProcessingState::Ready);
        container.clear();
        assert!(!container.has_data());
        assert_eq!(container.processing_state(), ProcessingState::Idle);
        assert_eq!(container.num_frames(), 4);
    }

    #[test]
    fn needs_removal_marks_buffers() {
        let container = interleaved_stereo(ramp8());
        let buffer = container.get_channel_buffer(0);
        assert!(!buffer.lock().marked_for_removal);

        container.update_processing_state(ProcessingState::NeedsRemoval);
        assert!(buffer.lock().marked_for_removal);
    }
}
