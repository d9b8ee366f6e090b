//! Container-to-buffer bridging
//!
//! [`ContainerToBufferAdapter`] couples one container dimension (an
//! audio channel) to one fixed-size output buffer and drives the
//! container's processing cycle from the consumer side: the first
//! adapter to win the processing token triggers a generation, every
//! adapter copies its channel out of the processed slot, and the last
//! one to consume flips the container back to ready.
//!
//! Per-cycle failures are logged and the cycle skipped; nothing here may
//! take down the render thread.

use std::sync::Arc;

use tracing::{error, warn};

use crate::container::{SharedAudioBuffer, SignalSourceContainer};
use crate::dimension::OrganizationStrategy;
use crate::error::{EngineError, Result};
use crate::state::ProcessingState;

/// Fixed-size sample sink for one channel.
///
/// Stand-in for the real-time buffer system at this crate's boundary;
/// the driver owns the real transport.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    pub channel_id: u32,
    pub samples: Vec<f64>,
    pub marked_for_removal: bool,
    pub marked_for_processing: bool,
}

impl AudioBuffer {
    pub fn new(channel_id: u32, num_samples: usize) -> Self {
        Self {
            channel_id,
            samples: vec![0.0; num_samples],
            marked_for_removal: false,
            marked_for_processing: false,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Bridges one container channel to one [`AudioBuffer`].
pub struct ContainerToBufferAdapter {
    container: Arc<SignalSourceContainer>,
    channel: u32,
    reader_id: Option<u32>,
    auto_advance: bool,
    update_flags: bool,
}

impl ContainerToBufferAdapter {
    pub fn new(container: Arc<SignalSourceContainer>, channel: u32) -> Self {
        Self {
            container,
            channel,
            reader_id: None,
            auto_advance: true,
            update_flags: true,
        }
    }

    /// When disabled, the adapter copies data but never acknowledges
    /// consumption, leaving the barrier to other readers.
    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    /// When disabled, the adapter never touches the buffer's removal and
    /// processing flags.
    pub fn with_update_flags(mut self, update_flags: bool) -> Self {
        self.update_flags = update_flags;
        self
    }

    pub fn reader_id(&self) -> Option<u32> {
        self.reader_id
    }

    /// Register as a reader of this channel and pre-fill the buffer with
    /// a direct extraction from the raw data, so the first render cycle
    /// has valid samples before any generation has run.
    ///
    /// The container must already be ready for processing.
    pub fn on_attach(&mut self, buffer: &SharedAudioBuffer) -> Result<()> {
        self.reader_id = Some(self.container.register_dimension_reader(self.channel));

        if !self.container.is_ready_for_processing() {
            return Err(EngineError::NotReady(
                self.container.processing_state().as_str(),
            ));
        }

        let weak = Arc::downgrade(buffer);
        self.container
            .register_state_change_callback(Box::new(move |_container, state| {
                if state == ProcessingState::NeedsRemoval {
                    if let Some(buffer) = weak.upgrade() {
                        buffer.lock().marked_for_removal = true;
                    }
                }
            }));

        // Container reads happen before the buffer lock is taken; removal
        // paths lock container then buffer, and the reverse order here
        // would deadlock against them.
        let len = buffer.lock().samples.len();
        let mut samples = vec![0.0; len];
        self.prefill(&mut samples);

        let mut buffer = buffer.lock();
        buffer.samples = samples;
        if self.update_flags {
            buffer.marked_for_processing = true;
        }
        Ok(())
    }

    /// One consumer-side cycle. Errors are logged, never propagated.
    pub fn process(&mut self, buffer: &SharedAudioBuffer) {
        let Some(reader_id) = self.reader_id else {
            warn!(channel = self.channel, "adapter processing before attach, skipping cycle");
            return;
        };

        match self.container.processing_state() {
            ProcessingState::NeedsRemoval => {
                if self.update_flags {
                    buffer.lock().marked_for_removal = true;
                }
                return;
            }
            ProcessingState::Ready => {
                // Only between generations can the stream actually be
                // over; an outstanding processed generation must still
                // reach every reader before the cursor check applies.
                if self.container.is_at_end() {
                    buffer.lock().marked_for_removal = true;
                    return;
                }
                // Single-writer election: whoever wins the token drives
                // this generation
                if self
                    .container
                    .try_acquire_processing_token(self.channel as i32)
                {
                    if let Err(err) = self.container.process_default() {
                        error!(channel = self.channel, error = %err, "default processing failed, skipping cycle");
                        return;
                    }
                }
            }
            _ => {}
        }

        if self.container.processing_state() != ProcessingState::Processed {
            return;
        }

        // Same ordering rule as on_attach: extract from the container
        // first, lock the buffer second.
        let len = buffer.lock().samples.len();
        let mut samples = vec![0.0; len];
        self.extract_channel_data(&mut samples);

        {
            let mut buffer = buffer.lock();
            buffer.samples = samples;
            if self.update_flags {
                buffer.marked_for_processing = true;
            }
        }

        if self.auto_advance {
            self.container.mark_dimension_consumed(self.channel, reader_id);
            if self.container.all_dimensions_consumed() {
                // Last consumer of this generation: rendezvous complete
                self.container.update_processing_state(ProcessingState::Ready);
                self.container.reset_processing_token();
            }
        }
    }

    /// Unhook the state callback and the barrier registration.
    pub fn on_detach(&mut self, _buffer: &SharedAudioBuffer) {
        self.container.unregister_state_change_callback();
        if self.reader_id.take().is_some() {
            self.container.unregister_dimension_reader(self.channel);
        }
    }

    /// Copy this channel from the processed slot, clamped and zero-padded
    /// to the output length.
    fn extract_channel_data(&self, output: &mut [f64]) {
        let processed = self.container.get_processed_data();
        if processed.is_empty() {
            output.fill(0.0);
            return;
        }

        // A single payload under interleaved organization is an
        // interleaved block; otherwise the slot is planar per channel.
        if self.container.organization() == OrganizationStrategy::Interleaved
            && processed.len() == 1
        {
            let samples = processed[0].as_f64_vec();
            let channels = self.container.channels().max(1) as usize;
            let frames = samples.len() / channels;
            for (i, slot) in output.iter_mut().enumerate() {
                *slot = if i < frames {
                    samples[i * channels + self.channel as usize]
                } else {
                    0.0
                };
            }
            return;
        }

        match processed.get(self.channel as usize) {
            Some(payload) => payload.copy_to_f64_slice(output),
            None => output.fill(0.0),
        }
    }

    /// Direct raw-data extraction from the current read position,
    /// bypassing the barrier.
    fn prefill(&self, output: &mut [f64]) {
        let start = self.container.read_position(self.channel);
        for (i, slot) in output.iter_mut().enumerate() {
            *slot = self
                .container
                .get_value_at(&[start + i as u64, self.channel as u64]);
        }
    }
}

/// One channel buffer coupled to its adapter, attached and ready to be
/// driven. This is the unit the render side holds per channel.
pub struct ContainerBuffer {
    buffer: SharedAudioBuffer,
    adapter: ContainerToBufferAdapter,
}

impl ContainerBuffer {
    /// Attach an adapter for `channel` to the container's shared buffer
    /// for that channel.
    pub fn new(container: Arc<SignalSourceContainer>, channel: u32) -> Result<Self> {
        let buffer = container.get_channel_buffer(channel);
        let mut adapter = ContainerToBufferAdapter::new(container, channel);
        adapter.on_attach(&buffer)?;
        Ok(Self { buffer, adapter })
    }

    /// Run one consumer cycle.
    pub fn process(&mut self) {
        self.adapter.process(&self.buffer);
    }

    pub fn buffer(&self) -> &SharedAudioBuffer {
        &self.buffer
    }

    /// Snapshot of the buffer's samples.
    pub fn samples(&self) -> Vec<f64> {
        self.buffer.lock().samples.clone()
    }

    pub fn detach(&mut self) {
        self.adapter.on_detach(&self.buffer);
    }
}
