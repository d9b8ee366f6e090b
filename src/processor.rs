//! Data processors
//!
//! A [`DataProcessor`] moves a window of container data into the
//! processed slot each generation. [`ContiguousAccessProcessor`] is the
//! stock implementation: a linear, optionally looping walk over frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::container::SignalSourceContainer;
use crate::data::DataVariant;
use crate::error::{EngineError, Result};
use crate::region::Region;

/// One stage of a container's processing pipeline.
pub trait DataProcessor: Send {
    /// Bind to a container, snapshot what's needed, validate config.
    fn on_attach(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()>;

    /// Release anything held for the container.
    fn on_detach(&mut self, container: &Arc<SignalSourceContainer>);

    /// Run one generation of work against the container.
    fn process(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()>;

    /// True while `process` is running.
    fn is_processing(&self) -> bool;
}

/// Ordered list of processors run after the default processor each
/// generation.
#[derive(Default)]
pub struct ProcessingChain {
    stages: Vec<Box<dyn DataProcessor>>,
}

impl ProcessingChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Box<dyn DataProcessor>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn run(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()> {
        for stage in &mut self.stages {
            stage.process(container)?;
        }
        Ok(())
    }
}

/// Advance a frame cursor.
///
/// Looping wraps modulo the loop span relative to the loop start; a
/// cursor still before the loop start enters the loop on its first
/// advance. Without looping the cursor saturates at `total`.
pub fn advance_frame_position(
    position: u64,
    amount: u64,
    total: u64,
    loop_bounds: Option<(u64, u64)>,
    looping: bool,
) -> u64 {
    if looping {
        if let Some((loop_start, loop_end)) = loop_bounds {
            if loop_end > loop_start {
                let span = loop_end - loop_start;
                let offset = if position < loop_start {
                    0
                } else {
                    position - loop_start
                };
                return loop_start + (offset + amount) % span;
            }
        }
    }
    (position + amount).min(total)
}

/// Windowed, contiguous walk over a container's frames.
///
/// Each `process` call extracts `[position, position + shape - 1]` into
/// the container's processed slot as planar per-channel payloads,
/// zero-filling past the extent and wrapping inside the loop region when
/// the container loops.
pub struct ContiguousAccessProcessor {
    prepared: bool,
    is_processing: AtomicBool,
    auto_advance: bool,
    /// `[frames, channels]`; defaulted at attach when empty
    output_shape: Vec<u64>,
    /// Per-channel frame cursor
    current_position: Vec<u64>,
    num_frames: u64,
    num_channels: u64,
    last_process_time: Option<Instant>,
}

impl Default for ContiguousAccessProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContiguousAccessProcessor {
    pub fn new() -> Self {
        Self {
            prepared: false,
            is_processing: AtomicBool::new(false),
            auto_advance: true,
            output_shape: Vec::new(),
            current_position: Vec::new(),
            num_frames: 0,
            num_channels: 0,
            last_process_time: None,
        }
    }

    /// Request a specific output window shape instead of the default
    /// `[min(1024, frames), channels]`.
    pub fn with_output_shape(mut self, shape: Vec<u64>) -> Self {
        self.output_shape = shape;
        self
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn output_shape(&self) -> &[u64] {
        &self.output_shape
    }

    pub fn current_position(&self) -> &[u64] {
        &self.current_position
    }

    pub fn last_process_time(&self) -> Option<Instant> {
        self.last_process_time
    }

    fn validate(&mut self, rank: usize) -> Result<()> {
        if self.output_shape.len() != rank {
            return Err(EngineError::RankMismatch {
                requested: self.output_shape.len(),
                available: rank,
            });
        }
        for (i, &size) in self.output_shape.iter().enumerate() {
            if size == 0 {
                return Err(EngineError::ZeroSizeDimension(i));
            }
        }
        if self.output_shape[0] > self.num_frames {
            return Err(EngineError::ExtentExceeded {
                dimension: 0,
                requested: self.output_shape[0],
                available: self.num_frames,
            });
        }
        if self.output_shape[1] > self.num_channels {
            return Err(EngineError::ExtentExceeded {
                dimension: 1,
                requested: self.output_shape[1],
                available: self.num_channels,
            });
        }
        if self.current_position.len() != self.num_channels as usize {
            warn!(
                positions = self.current_position.len(),
                channels = self.num_channels,
                "cursor count does not match channel count, resetting"
            );
            self.current_position = vec![0; self.num_channels as usize];
        }
        Ok(())
    }

    /// Map a logical walk frame to a physical one. `None` means the frame
    /// is past the extent and should be zero-filled.
    fn map_frame(
        &self,
        frame: u64,
        looping: bool,
        loop_bounds: Option<(u64, u64)>,
    ) -> Option<u64> {
        if looping {
            if let Some((loop_start, loop_end)) = loop_bounds {
                if loop_end >= loop_start {
                    let wrapped = if frame < loop_start {
                        frame
                    } else {
                        loop_start + (frame - loop_start) % (loop_end - loop_start + 1)
                    };
                    return (wrapped < self.num_frames).then_some(wrapped);
                }
            }
        }
        (frame < self.num_frames).then_some(frame)
    }

    fn run(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()> {
        let looping = container.is_looping();
        let loop_region = container.loop_region();
        let loop_bounds = loop_region
            .start_coordinates
            .first()
            .zip(loop_region.end_coordinates.first())
            .map(|(&s, &e)| (s, e));

        let window_frames = self.output_shape[0];
        let window_channels = self.output_shape[1];
        let min_frame = self.current_position.iter().copied().min().unwrap_or(0);

        // Physical frames for the window, split into contiguous runs so
        // extraction stays type-preserving bulk copies.
        let frames: Vec<Option<u64>> = (0..window_frames)
            .map(|i| self.map_frame(min_frame + i, looping, loop_bounds))
            .collect();

        let mut parts: Vec<Option<DataVariant>> = vec![None; window_channels as usize];
        let mut i = 0usize;
        while i < frames.len() {
            match frames[i] {
                Some(start) => {
                    let mut len = 1u64;
                    while i + (len as usize) < frames.len()
                        && frames[i + len as usize] == Some(start + len)
                    {
                        len += 1;
                    }
                    let region = Region::span(
                        vec![start, 0],
                        vec![start + len - 1, window_channels - 1],
                    );
                    let extracted = container.get_region_data(&region)?;
                    for (part, payload) in parts.iter_mut().zip(extracted) {
                        match part {
                            Some(existing) => existing.extend_from(&payload),
                            None => *part = Some(payload),
                        }
                    }
                    i += len as usize;
                }
                None => {
                    // Past the extent: zero-fill one frame per channel,
                    // in the source's sample kind so a later in-range run
                    // extends instead of being dropped
                    for part in parts.iter_mut() {
                        match part {
                            Some(existing) => {
                                let zero = existing.zeroed_like(1);
                                existing.extend_from(&zero);
                            }
                            None => *part = Some(container.zeroed_payload(1)),
                        }
                    }
                    i += 1;
                }
            }
        }

        let processed: Vec<DataVariant> = parts
            .into_iter()
            .map(|part| part.unwrap_or_default())
            .collect();
        container.set_processed_data(processed);

        if self.auto_advance {
            for position in &mut self.current_position {
                *position = advance_frame_position(
                    *position,
                    window_frames,
                    self.num_frames,
                    loop_bounds,
                    looping,
                );
            }
            container.set_read_position(&self.current_position);
        }

        self.last_process_time = Some(Instant::now());
        Ok(())
    }
}

impl DataProcessor for ContiguousAccessProcessor {
    fn on_attach(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()> {
        let dimensions = container.dimensions();
        self.num_frames = container.num_frames();
        self.num_channels = container.channels() as u64;

        if container.total_elements() == 0 {
            warn!("attaching to a container with no data elements");
        }

        if self.current_position.is_empty() {
            self.current_position = vec![0; self.num_channels as usize];
        }
        let stream_positions = container.read_positions();
        if !stream_positions.is_empty() {
            self.current_position = stream_positions;
        }

        if self.output_shape.is_empty() {
            self.output_shape = vec![self.num_frames.min(1024), self.num_channels];
        }
        self.validate(dimensions.len())?;

        self.prepared = true;
        container.mark_ready_for_processing(true);
        info!(
            frames = self.output_shape[0],
            channels = self.output_shape[1],
            "contiguous access processor attached"
        );
        Ok(())
    }

    fn on_detach(&mut self, _container: &Arc<SignalSourceContainer>) {
        self.prepared = false;
        self.current_position.clear();
        self.num_frames = 0;
        self.num_channels = 0;
    }

    fn process(&mut self, container: &Arc<SignalSourceContainer>) -> Result<()> {
        if !self.prepared {
            return Err(EngineError::NotPrepared("contiguous access processor"));
        }
        self.is_processing.store(true, Ordering::SeqCst);
        let result = self.run(container);
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }
}
