//! Producer-facing mixer.
//!
//! `AudioMixer` is the single owner of everything the output path needs: the
//! DAC peripheral, the buffer pool, the pipeline, the volume controller and
//! the mask of enabled DACs. Its lifetime runs from [`AudioMixer::new`] to
//! [`AudioMixer::close`], which hands the peripheral back.
//!
//! # Typical use
//!
//! ```ignore
//! let mut mixer: AudioMixer<_, 2, 1024> = AudioMixer::new(abdac, MixerConfig::new());
//! mixer.start(44_100, 2, 16, false)?;
//! loop {
//!     let handle = match mixer.acquire_buffer(1024) {
//!         Ok(h) => h,
//!         Err(MixerError::PoolExhausted) => { mixer.pump(256)?; continue; }
//!         Err(e) => return Err(e),
//!     };
//!     let frames = decoder.fill(mixer.buffer_mut(&handle));
//!     mixer.submit(handle, frames)?;
//!     mixer.pump(256)?;
//! }
//! ```

use platform::{AdcSource, AudioConfig, ClockControl, DacConfig, DacMask, DacSink, Volume};
use thiserror_no_std::Error;

use crate::engine::{OutputPipeline, PipelineSettings, PipelineState, RateOutcome};
use crate::error::MixerError;
use crate::pool::{BufferHandle, BufferPool, BufferState, Refused};
use crate::volume::{VolumeControl, DEFAULT_VOLUME_STEP};

/// When submitted buffers reach the DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputStrategy {
    /// `submit` streams the buffer before returning.
    Direct,
    /// `submit` only queues; the owner calls [`AudioMixer::pump`].
    Buffered,
}

/// Construction-time mixer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerConfig {
    /// Output strategy.
    pub strategy: OutputStrategy,
    /// Clock derivation, oversampling and retry budget.
    pub pipeline: PipelineSettings,
    /// Step for `increase_volume` / `decrease_volume`.
    pub volume_step: u8,
    /// Volume at construction.
    pub initial_volume: Volume,
    /// DACs enabled at construction.
    pub dacs: DacMask,
}

impl MixerConfig {
    /// Buffered output, OSC1 divided clock, unity gain, ABDAC enabled.
    pub const fn new() -> Self {
        Self {
            strategy: OutputStrategy::Buffered,
            pipeline: PipelineSettings::new(),
            volume_step: DEFAULT_VOLUME_STEP,
            initial_volume: Volume::MAX,
            dacs: DacMask::ABDAC,
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Why [`AudioMixer::submit`] did not complete.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The buffer was not accepted; the caller owns it again.
    #[error("buffer rejected: {error}")]
    Rejected {
        /// The buffer, still Filled.
        handle: BufferHandle,
        /// Reason.
        error: MixerError,
    },
    /// Output started but did not finish; the buffer is already back in the pool.
    #[error("output aborted: {0}")]
    Aborted(MixerError),
}

impl SubmitError {
    /// Underlying mixer error.
    pub fn error(&self) -> MixerError {
        match self {
            Self::Rejected { error, .. } => *error,
            Self::Aborted(error) => *error,
        }
    }
}

impl From<Refused> for SubmitError {
    fn from(r: Refused) -> Self {
        Self::Rejected {
            handle: r.handle,
            error: r.error,
        }
    }
}

/// Snapshot of the mixer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MixerStatus {
    /// Pipeline state.
    pub state: PipelineState,
    /// Active DAC configuration, once one has been applied.
    pub config: Option<DacConfig>,
    /// Stored volume.
    pub volume: Volume,
    /// Mute flag.
    pub muted: bool,
    /// `true` while the pipeline is running.
    pub running: bool,
    /// Enabled DACs.
    pub dacs: DacMask,
    /// Free pool buffers.
    pub free_buffers: usize,
    /// Buffers queued or in flight.
    pub queued: usize,
}

/// Mixer over a DAC peripheral `P` and a pool of `N` × `SAMPLES` samples.
pub struct AudioMixer<P, const N: usize, const SAMPLES: usize> {
    peripheral: P,
    pool: BufferPool<N, SAMPLES>,
    pipeline: OutputPipeline<N>,
    volume: VolumeControl,
    dacs: DacMask,
    strategy: OutputStrategy,
}

impl<P, const N: usize, const SAMPLES: usize> AudioMixer<P, N, SAMPLES>
where
    P: DacSink + ClockControl,
{
    /// Take ownership of the peripheral. The pipeline starts `Stopped`.
    pub const fn new(peripheral: P, config: MixerConfig) -> Self {
        Self {
            peripheral,
            pool: BufferPool::new(),
            pipeline: OutputPipeline::new(config.pipeline),
            volume: VolumeControl::with_step(config.initial_volume, config.volume_step),
            dacs: config.dacs,
            strategy: config.strategy,
        }
    }

    /// Stop output and hand the peripheral back.
    pub fn close(mut self) -> P {
        self.stop();
        self.peripheral
    }

    /// Size the pool: `nb` buffers of `size` samples.
    ///
    /// # Errors
    ///
    /// See [`BufferPool::configure`].
    pub fn create_buffers(&mut self, nb: usize, size: usize) -> Result<(), MixerError> {
        self.pool.configure(nb, size)
    }

    // ─── Producer path ───────────────────────────────────────────────────────

    /// Take a free buffer of at least `size` samples. Never blocks.
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when every buffer is in use; `InvalidConfig` if `size`
    /// exceeds the buffer size.
    pub fn acquire_buffer(&mut self, size: usize) -> Result<BufferHandle, MixerError> {
        self.pool.acquire_sized(size)
    }

    /// Samples of an acquired buffer, for filling.
    ///
    /// Interleaved by channel; 8-bit formats use the low byte of each slot.
    pub fn buffer_mut(&mut self, handle: &BufferHandle) -> &mut [i16] {
        self.pool.samples_mut(handle)
    }

    /// Samples of a buffer.
    pub fn buffer(&self, handle: &BufferHandle) -> &[i16] {
        self.pool.samples(handle)
    }

    /// Return an acquired buffer without playing it.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the buffer is not Filled; the handle comes back.
    pub fn discard_buffer(&mut self, handle: BufferHandle) -> Result<(), Refused> {
        self.pool.discard(handle)
    }

    /// Hand a filled buffer of `frames` frames to the pipeline.
    ///
    /// With [`OutputStrategy::Direct`] the buffer is streamed before this
    /// returns; with [`OutputStrategy::Buffered`] it waits for [`pump`](Self::pump).
    ///
    /// # Errors
    ///
    /// - [`SubmitError::Rejected`]: not queued (`NotRunning`, `InvalidState`).
    /// - [`SubmitError::Aborted`]: direct output timed out part way.
    pub fn submit(&mut self, handle: BufferHandle, frames: usize) -> Result<(), SubmitError> {
        self.pipeline.enqueue(&mut self.pool, handle, frames)?;
        match self.strategy {
            OutputStrategy::Buffered => Ok(()),
            OutputStrategy::Direct => self
                .pipeline
                .drain(&mut self.peripheral, &mut self.pool, &self.volume)
                .map_err(SubmitError::Aborted),
        }
    }

    /// Stream up to `max_frames` queued frames. Returns the frames written.
    ///
    /// # Errors
    ///
    /// See [`OutputPipeline::pump`].
    pub fn pump(&mut self, max_frames: usize) -> Result<usize, MixerError> {
        self.pipeline
            .pump(&mut self.peripheral, &mut self.pool, &self.volume, max_frames)
    }

    /// Fill `frames` frames of `handle` from a capture source.
    ///
    /// Each frame waits for the source under the pipeline's retry budget.
    /// Returns `false` if the buffer is not owned by the producer or the
    /// source stalled; frames read before the stall stay in the buffer.
    pub fn input<A: AdcSource>(
        &mut self,
        source: &mut A,
        handle: &BufferHandle,
        frames: usize,
    ) -> bool {
        if self.pool.state(handle.index()) != Some(BufferState::Filled) {
            warn!("capture into buffer {} not owned by the producer", handle.index());
            return false;
        }
        let (channels, bit_depth) = self
            .pipeline
            .config()
            .map_or((2, 16), |c| (c.channels(), c.bit_depth()));
        let narrow = |s: i16| if bit_depth == 8 { s.wrapping_shr(8) } else { s };
        let retry = self.pipeline.settings().retry;
        let buf = self.pool.samples_mut(handle);
        let stride = usize::from(channels);
        let mut chunks = buf.chunks_exact_mut(stride);

        for _ in 0..frames {
            let Some(slot) = chunks.next() else {
                warn!("capture of {} frames exceeds the buffer", frames);
                return false;
            };
            if retry.wait_until(|| source.is_ready()).is_err() {
                return false;
            }
            let (ch0, ch1) = source.read_frame();
            for (dst, s) in slot.iter_mut().zip([ch0, ch1]) {
                *dst = narrow(s);
            }
        }
        true
    }

    // ─── Control ─────────────────────────────────────────────────────────────

    /// Start output at `sample_rate` Hz.
    ///
    /// # Errors
    ///
    /// - `NoDacEnabled` unless the ABDAC is in the enabled mask.
    /// - See [`OutputPipeline::start`].
    pub fn start(
        &mut self,
        sample_rate: u32,
        channels: u8,
        bit_depth: u8,
        swap_channels: bool,
    ) -> Result<RateOutcome, MixerError> {
        if !self.dacs.contains(DacMask::ABDAC) {
            return Err(MixerError::NoDacEnabled);
        }
        let audio = AudioConfig {
            sample_rate,
            channels,
            bit_depth,
            swap_channels,
        };
        self.pipeline.start(&mut self.peripheral, audio)
    }

    /// Change the format while running.
    ///
    /// # Errors
    ///
    /// See [`OutputPipeline::setup`].
    pub fn setup(
        &mut self,
        sample_rate: u32,
        channels: u8,
        bit_depth: u8,
        swap_channels: bool,
    ) -> Result<RateOutcome, MixerError> {
        let audio = AudioConfig {
            sample_rate,
            channels,
            bit_depth,
            swap_channels,
        };
        self.pipeline.setup(&mut self.peripheral, audio)
    }

    /// Flush queued output. See [`OutputPipeline::flush`].
    ///
    /// # Errors
    ///
    /// `NotRunning`, or `Timeout` from a stalled drain.
    pub fn flush(&mut self, force: bool) -> Result<(), MixerError> {
        self.pipeline
            .flush(&mut self.peripheral, &mut self.pool, &self.volume, force)
    }

    /// Stop output and return every queued buffer. Idempotent.
    pub fn stop(&mut self) {
        self.pipeline.stop(&mut self.peripheral, &mut self.pool);
    }

    /// Enable the DACs in `mask`. Returns the new mask.
    pub fn enable_dacs(&mut self, mask: DacMask) -> DacMask {
        self.dacs = self.dacs.union(mask);
        self.dacs
    }

    /// Disable the DACs in `mask`. Disabling the ABDAC stops output.
    pub fn disable_dacs(&mut self, mask: DacMask) -> DacMask {
        if mask.contains(DacMask::ABDAC) && self.dacs.contains(DacMask::ABDAC) {
            self.stop();
        }
        self.dacs = self.dacs.difference(mask);
        self.dacs
    }

    // ─── Volume ──────────────────────────────────────────────────────────────

    /// Raise the volume by one step.
    pub fn increase_volume(&mut self) -> Volume {
        self.volume.increase()
    }

    /// Lower the volume by one step.
    pub fn decrease_volume(&mut self) -> Volume {
        self.volume.decrease()
    }

    /// Stored volume.
    pub fn get_volume(&self) -> Volume {
        self.volume.get()
    }

    /// Set the volume; values above 255 clamp to 255.
    pub fn set_volume(&mut self, level: u32) -> Volume {
        self.volume.set_clamped(level)
    }

    /// `true` while muted.
    pub fn is_muted(&self) -> bool {
        self.volume.is_muted()
    }

    /// Mute or unmute without touching the stored volume.
    pub fn mute(&mut self, muted: bool) {
        self.volume.mute(muted);
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// Snapshot of the mixer state.
    pub fn status(&self) -> MixerStatus {
        MixerStatus {
            state: self.pipeline.state(),
            config: self.pipeline.config().copied(),
            volume: self.volume.get(),
            muted: self.volume.is_muted(),
            running: self.pipeline.is_running(),
            dacs: self.dacs,
            free_buffers: self.pool.free_count(),
            queued: self.pipeline.queued(),
        }
    }

    /// State of pool slot `index`.
    pub fn buffer_state(&self, index: usize) -> Option<BufferState> {
        self.pool.state(index)
    }

    /// The DAC peripheral.
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// The DAC peripheral, mutably.
    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.peripheral
    }

    /// Output strategy chosen at construction.
    pub fn strategy(&self) -> OutputStrategy {
        self.strategy
    }
}
