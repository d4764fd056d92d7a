//! Output pipeline state machine.
//!
//! `OutputPipeline` owns the active DAC configuration and a FIFO of buffers
//! handed over by the producer. It streams them one frame at a time into a
//! [`DacSink`], waiting for the sink's ready flag under a bounded
//! [`RetryPolicy`].
//!
//! The pipeline holds no hardware and no buffers of its own: the sink, the
//! [`BufferPool`] and the [`VolumeControl`] are passed into each call by the
//! owner (normally [`AudioMixer`](crate::mixer::AudioMixer)). That keeps the
//! state machine testable on the host with a mock sink.
//!
//! ```text
//!            configure            start
//!   Stopped ──────────► Configured ─────► Running ◄──┐
//!      ▲                    │               │       │ flush
//!      │      stop          │    stop       ▼       │
//!      └────────────────────┴──────────── Flushing ─┘
//! ```

use heapless::Deque;
use platform::{
    AudioConfig, ClockControl, ClockSource, DacConfig, DacSink, GclkSetting, ReferenceClocks,
};

use crate::clock_math::{
    actual_sample_rate, compute_divider, degraded_sample_rate, lookup_standard_rate,
    setting_sample_rate, OVERSAMPLE_FACTOR,
};
use crate::error::MixerError;
use crate::pool::{BufferHandle, BufferPool, Refused};
use crate::retry::{RetryPolicy, ABDAC_TIMEOUT_POLLS};
use crate::volume::VolumeControl;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipelineState {
    /// DAC disabled, queue empty.
    Stopped,
    /// Clock programmed, DAC not streaming.
    Configured,
    /// Accepting and streaming buffers.
    Running,
    /// Inside `flush`; returns to `Running` before `flush` returns.
    Flushing,
}

impl PipelineState {
    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Configured => "Configured",
            Self::Running => "Running",
            Self::Flushing => "Flushing",
        }
    }
}

/// How the generic clock is derived from the requested sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockMode {
    /// Compute the divider against one fixed reference clock.
    Divided {
        /// Reference clock feeding the DAC.
        source: ClockSource,
    },
    /// Pick source and divider from the standard-rate table.
    StandardRates,
}

/// Result of applying a sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RateOutcome {
    /// The requested rate (or its nearest divided approximation) is in effect.
    Applied {
        /// Achieved sample rate.
        actual_hz: u32,
    },
    /// The reference clock is too slow; the divider is disabled and the DAC
    /// runs at the fastest rate the source allows.
    Degraded {
        /// Achieved sample rate.
        actual_hz: u32,
    },
}

impl RateOutcome {
    /// Achieved sample rate.
    pub const fn actual_hz(self) -> u32 {
        match self {
            Self::Applied { actual_hz } | Self::Degraded { actual_hz } => actual_hz,
        }
    }

    /// `true` for the fallback rate.
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Construction-time settings of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Divider strategy.
    pub clock_mode: ClockMode,
    /// Board reference clock frequencies.
    pub clocks: ReferenceClocks,
    /// Generic clock to sample rate ratio.
    pub oversample: u32,
    /// Readiness wait budget per frame.
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    /// OSC1 (audio crystal), 256× oversampling, default retry budget.
    pub const fn new() -> Self {
        Self {
            clock_mode: ClockMode::Divided {
                source: ClockSource::Osc1,
            },
            clocks: ReferenceClocks::EVK1104,
            oversample: OVERSAMPLE_FACTOR,
            retry: RetryPolicy::new(ABDAC_TIMEOUT_POLLS),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// One buffer in the output queue.
#[derive(Debug)]
struct Transfer {
    handle: BufferHandle,
    /// Valid samples in the buffer.
    len: usize,
    /// Next sample to send.
    cursor: usize,
}

/// Output pipeline over a pool of at most `N` buffers.
pub struct OutputPipeline<const N: usize> {
    state: PipelineState,
    settings: PipelineSettings,
    config: Option<DacConfig>,
    queue: Deque<Transfer, N>,
}

impl<const N: usize> OutputPipeline<N> {
    /// Create a pipeline in the `Stopped` state.
    pub const fn new(settings: PipelineSettings) -> Self {
        Self {
            state: PipelineState::Stopped,
            settings,
            config: None,
            queue: Deque::new(),
        }
    }

    /// Return the current [`PipelineState`].
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// `true` while streaming is possible.
    pub fn is_running(&self) -> bool {
        self.state == PipelineState::Running
    }

    /// Configuration currently programmed, if any.
    pub fn config(&self) -> Option<&DacConfig> {
        self.config.as_ref()
    }

    /// Construction-time settings.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Buffers waiting or in flight.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Pool slot of the buffer currently being streamed.
    pub fn in_flight(&self) -> Option<usize> {
        self.queue.front().map(|t| t.handle.index())
    }

    /// Program the clock for `audio` without starting output.
    ///
    /// Transitions:
    /// - `Stopped    → Configured`  ✓
    /// - `Configured → Configured`  ✓
    /// - `Running / Flushing → —`   returns `Err(InvalidState)`
    ///
    /// # Errors
    ///
    /// `InvalidState` as above, `InvalidConfig` for an unsupported format.
    pub fn configure<S>(
        &mut self,
        sink: &mut S,
        audio: AudioConfig,
    ) -> Result<RateOutcome, MixerError>
    where
        S: DacSink + ClockControl,
    {
        match self.state {
            PipelineState::Stopped | PipelineState::Configured => {}
            PipelineState::Running | PipelineState::Flushing => {
                return Err(MixerError::InvalidState)
            }
        }
        let outcome = self.apply(sink, audio)?;
        self.transition(PipelineState::Configured);
        Ok(outcome)
    }

    /// Program the clock and start output.
    ///
    /// Transitions:
    /// - `Stopped / Configured → Running`  ✓
    /// - `Running / Flushing → —`          returns `Err(InvalidState)`
    ///
    /// An unachievable rate is not an error: the pipeline passes through
    /// `Configured` with the divider disabled, logs a warning, and still
    /// starts. The caller sees [`RateOutcome::Degraded`].
    ///
    /// # Errors
    ///
    /// `InvalidState` as above, `InvalidConfig` for an unsupported format.
    pub fn start<S>(&mut self, sink: &mut S, audio: AudioConfig) -> Result<RateOutcome, MixerError>
    where
        S: DacSink + ClockControl,
    {
        match self.state {
            PipelineState::Stopped | PipelineState::Configured => {}
            PipelineState::Running | PipelineState::Flushing => {
                return Err(MixerError::InvalidState)
            }
        }
        let outcome = self.apply(sink, audio)?;
        if outcome.is_degraded() {
            self.transition(PipelineState::Configured);
        }
        sink.enable();
        self.transition(PipelineState::Running);
        Ok(outcome)
    }

    /// Re-apply a configuration while running, without a stop/start cycle.
    ///
    /// Queued buffers stay queued and are read with the new format.
    ///
    /// # Errors
    ///
    /// `NotRunning` unless `Running` (state unchanged), `InvalidConfig` for an
    /// unsupported format.
    pub fn setup<S>(&mut self, sink: &mut S, audio: AudioConfig) -> Result<RateOutcome, MixerError>
    where
        S: DacSink + ClockControl,
    {
        if self.state != PipelineState::Running {
            return Err(MixerError::NotRunning);
        }
        self.apply(sink, audio)
    }

    /// Queue a Filled buffer holding `frames` frames.
    ///
    /// `frames` is clamped to what the buffer can hold.
    ///
    /// # Errors
    ///
    /// - `NotRunning` unless `Running`.
    /// - `InvalidState` if the buffer is not Filled or the queue is full.
    ///
    /// The handle comes back in [`Refused`] in every case.
    pub fn enqueue<const SAMPLES: usize>(
        &mut self,
        pool: &mut BufferPool<N, SAMPLES>,
        handle: BufferHandle,
        frames: usize,
    ) -> Result<(), Refused> {
        if self.state != PipelineState::Running {
            return Err(Refused {
                handle,
                error: MixerError::NotRunning,
            });
        }
        let channels = usize::from(self.channels());
        let max_frames = pool.buffer_size().checked_div(channels).unwrap_or(0);
        let frames = if frames > max_frames {
            warn!("length {} frames clamped to {}", frames, max_frames);
            max_frames
        } else {
            frames
        };
        if self.queue.is_full() {
            return Err(Refused {
                handle,
                error: MixerError::InvalidState,
            });
        }
        let len = match pool.begin_drain(&handle, frames.saturating_mul(channels)) {
            Ok(len) => len,
            Err(error) => return Err(Refused { handle, error }),
        };
        self.queue
            .push_back(Transfer {
                handle,
                len,
                cursor: 0,
            })
            .map_err(|t| {
                pool.cancel_drain(&t.handle);
                Refused {
                    handle: t.handle,
                    error: MixerError::InvalidState,
                }
            })
    }

    /// Stream up to `max_frames` frames from the head of the queue.
    ///
    /// Fully sent buffers go back to the pool. Returns the number of frames
    /// written.
    ///
    /// # Errors
    ///
    /// - `NotRunning` unless `Running` or `Flushing`.
    /// - `Timeout` if the sink stays busy for a whole retry budget. The head
    ///   buffer is aborted and returned to the pool; the pipeline keeps running.
    pub fn pump<S, const SAMPLES: usize>(
        &mut self,
        sink: &mut S,
        pool: &mut BufferPool<N, SAMPLES>,
        volume: &VolumeControl,
        max_frames: usize,
    ) -> Result<usize, MixerError>
    where
        S: DacSink,
    {
        match self.state {
            PipelineState::Running | PipelineState::Flushing => {}
            PipelineState::Stopped | PipelineState::Configured => {
                return Err(MixerError::NotRunning)
            }
        }
        let channels = self.channels();
        let bit_depth = self.bit_depth();
        let retry = self.settings.retry;
        let mut written: usize = 0;

        while written < max_frames {
            let Some(head) = self.queue.front_mut() else {
                break;
            };
            let samples = pool.samples(&head.handle);
            let Some(frame) = frame_at(samples, head.len, head.cursor, channels, bit_depth) else {
                self.retire_head(pool);
                continue;
            };
            if let Err(e) = retry.wait_until(|| sink.is_ready()) {
                warn!(
                    "buffer {} aborted at sample {} of {}",
                    head.handle.index(),
                    head.cursor,
                    head.len
                );
                self.retire_head(pool);
                return Err(e);
            }
            let (ch0, ch1) = volume.scale_frame(frame);
            sink.write_frame(ch0, ch1);
            head.cursor = head.cursor.saturating_add(usize::from(channels));
            written = written.saturating_add(1);
            if head.cursor >= head.len {
                self.retire_head(pool);
            }
        }
        Ok(written)
    }

    /// Flush the queue.
    ///
    /// Transitions: `Running → Flushing → Running`.
    ///
    /// - `force = false`: stream everything queued, each frame under the
    ///   bounded wait. A timeout aborts that buffer and discards the rest.
    /// - `force = true`: drop the in-flight buffer and everything behind it.
    ///
    /// Either way every buffer is back in the pool, any latched underrun is
    /// acknowledged, and the sink is idle but still enabled when this returns.
    ///
    /// # Errors
    ///
    /// `NotRunning` unless `Running`; `Timeout` from a stalled drain.
    pub fn flush<S, const SAMPLES: usize>(
        &mut self,
        sink: &mut S,
        pool: &mut BufferPool<N, SAMPLES>,
        volume: &VolumeControl,
        force: bool,
    ) -> Result<(), MixerError>
    where
        S: DacSink,
    {
        if self.state != PipelineState::Running {
            return Err(MixerError::NotRunning);
        }
        self.transition(PipelineState::Flushing);
        let result = if force {
            Ok(())
        } else {
            self.drain(sink, pool, volume)
        };
        let dropped = self.discard_all(pool);
        if dropped > 0 {
            debug!("flush dropped {} buffers", dropped);
        }
        sink.clear_underrun();
        self.transition(PipelineState::Running);
        result
    }

    /// Stream until the queue is empty.
    ///
    /// # Errors
    ///
    /// As [`pump`](Self::pump); the queue may be left non-empty on error.
    pub fn drain<S, const SAMPLES: usize>(
        &mut self,
        sink: &mut S,
        pool: &mut BufferPool<N, SAMPLES>,
        volume: &VolumeControl,
    ) -> Result<(), MixerError>
    where
        S: DacSink,
    {
        while !self.queue.is_empty() {
            self.pump(sink, pool, volume, usize::MAX)?;
        }
        Ok(())
    }

    /// Stop output from any state.
    ///
    /// Every queued buffer goes back to the pool, the sink is disabled and its
    /// underrun flag cleared.
    /// Stopping an already stopped pipeline does nothing.
    pub fn stop<S, const SAMPLES: usize>(&mut self, sink: &mut S, pool: &mut BufferPool<N, SAMPLES>)
    where
        S: DacSink,
    {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.discard_all(pool);
        sink.disable();
        sink.clear_underrun();
        self.transition(PipelineState::Stopped);
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn channels(&self) -> u8 {
        self.config.map_or(2, |c| c.channels())
    }

    fn bit_depth(&self) -> u8 {
        self.config.map_or(16, |c| c.bit_depth())
    }

    /// Validate, program the clock, align the swap state, store the config.
    fn apply<S>(&mut self, sink: &mut S, audio: AudioConfig) -> Result<RateOutcome, MixerError>
    where
        S: DacSink + ClockControl,
    {
        if !audio.is_supported() {
            warn!(
                "unsupported format: {} Hz, {} ch, {} bit",
                audio.sample_rate,
                audio.channels,
                audio.bit_depth
            );
            return Err(MixerError::InvalidConfig);
        }
        let (clock, outcome) = self.plan_clock(audio.sample_rate)?;
        sink.set_clock(clock);
        // The sink may arrive already swapped from a previous owner.
        if sink.is_swapped() != audio.swap_channels {
            sink.swap_channels();
        }
        self.config = Some(DacConfig {
            requested: audio,
            clock,
            actual_rate_hz: outcome.actual_hz(),
        });
        debug!(
            "dac clock {} div {} ({}) -> {} Hz",
            clock.source.as_str(),
            clock.div,
            clock.div_enabled,
            outcome.actual_hz()
        );
        Ok(outcome)
    }

    fn plan_clock(&self, sample_rate: u32) -> Result<(GclkSetting, RateOutcome), MixerError> {
        let clocks = &self.settings.clocks;
        let oversample = self.settings.oversample;
        match self.settings.clock_mode {
            ClockMode::Divided { source } => {
                let bus_hz = clocks.hz(source);
                match compute_divider(bus_hz, sample_rate, oversample) {
                    Ok(divider) => Ok((
                        divider.with_source(source),
                        RateOutcome::Applied {
                            actual_hz: actual_sample_rate(bus_hz, divider, oversample),
                        },
                    )),
                    Err(MixerError::RateUnachievable) => {
                        let actual_hz = degraded_sample_rate(bus_hz, oversample);
                        warn!(
                            "{} Hz unachievable from {}, running at {} Hz",
                            sample_rate,
                            source.as_str(),
                            actual_hz
                        );
                        Ok((GclkSetting::undivided(source), RateOutcome::Degraded { actual_hz }))
                    }
                    Err(e) => Err(e),
                }
            }
            ClockMode::StandardRates => match lookup_standard_rate(sample_rate) {
                Ok(row) => {
                    let setting = row.setting();
                    Ok((
                        setting,
                        RateOutcome::Applied {
                            actual_hz: setting_sample_rate(clocks, setting, oversample),
                        },
                    ))
                }
                Err(_) => {
                    let setting = GclkSetting::undivided(ClockSource::Osc0);
                    let actual_hz = setting_sample_rate(clocks, setting, oversample);
                    warn!(
                        "{} Hz not a standard rate, running at {} Hz",
                        sample_rate,
                        actual_hz
                    );
                    Ok((setting, RateOutcome::Degraded { actual_hz }))
                }
            },
        }
    }

    /// Pop the head transfer and return its buffer to the pool.
    fn retire_head<const SAMPLES: usize>(&mut self, pool: &mut BufferPool<N, SAMPLES>) {
        if let Some(t) = self.queue.pop_front() {
            if let Err(r) = pool.release(t.handle) {
                warn!("buffer {} not released: {}", r.handle.index(), r.error.as_str());
            }
        }
    }

    fn discard_all<const SAMPLES: usize>(&mut self, pool: &mut BufferPool<N, SAMPLES>) -> usize {
        let mut dropped: usize = 0;
        while !self.queue.is_empty() {
            self.retire_head(pool);
            dropped = dropped.saturating_add(1);
        }
        dropped
    }

    fn transition(&mut self, to: PipelineState) {
        if self.state != to {
            debug!("pipeline {} -> {}", self.state.as_str(), to.as_str());
            self.state = to;
        }
    }
}

impl<const N: usize> Default for OutputPipeline<N> {
    fn default() -> Self {
        Self::new(PipelineSettings::new())
    }
}

/// Frame starting at sample `cursor`, or `None` once fewer than `channels`
/// valid samples remain.
///
/// Mono is duplicated to both channels; 8-bit samples sit in the low byte
/// and are widened into the high byte.
pub fn frame_at(
    samples: &[i16],
    len: usize,
    cursor: usize,
    channels: u8,
    bit_depth: u8,
) -> Option<(i16, i16)> {
    let widen = |s: i16| if bit_depth == 8 { s.wrapping_shl(8) } else { s };
    let end = cursor.checked_add(usize::from(channels))?;
    if end > len {
        return None;
    }
    let ch0 = widen(*samples.get(cursor)?);
    let ch1 = if channels == 1 {
        ch0
    } else {
        widen(*samples.get(cursor.checked_add(1)?)?)
    };
    Some((ch0, ch1))
}
