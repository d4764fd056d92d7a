//! Mock implementations for testing
//!
//! In-memory stand-ins for the DAC sink, clock generator and capture source.
//! They record every call so tests can assert on exact hardware traffic.

#![cfg(any(test, feature = "std"))]

use crate::audio::{AdcSource, ClockControl, DacSink, GclkSetting};
use crate::clock_config::ClockSource;

/// Number of frames the mock keeps for inspection.
pub const MOCK_FRAME_CAPACITY: usize = 4096;

/// Readiness behaviour of [`MockDac`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Ready on every poll.
    Always,
    /// Never ready; every wait times out.
    Stalled,
    /// Not ready for `n` polls before each frame, then ready.
    After(u32),
    /// Ready for the first `n` frames, stalled afterwards.
    StallAfterFrames(usize),
}

/// Mock DAC — records all calls for test assertions.
pub struct MockDac {
    /// Readiness script
    pub readiness: Readiness,
    /// Recorded frames, as they would reach the data register
    pub frames: heapless::Vec<(i16, i16), MOCK_FRAME_CAPACITY>,
    /// Total frames written, including those beyond `MOCK_FRAME_CAPACITY`
    pub frames_written: usize,
    /// Total `is_ready` polls
    pub polls: usize,
    /// Whether the DAC is currently enabled
    pub enabled: bool,
    /// Number of `enable` calls
    pub enable_calls: usize,
    /// Number of `disable` calls
    pub disable_calls: usize,
    /// Persistent swap flag
    pub swapped: bool,
    /// Number of `clear_underrun` calls
    pub underrun_clears: usize,
    /// Last programmed generic clock
    pub gclk: GclkSetting,
    /// Number of `set_clock` calls
    pub clock_writes: usize,
    pending_polls: u32,
}

impl MockDac {
    /// Create a mock that is always ready.
    pub const fn new() -> Self {
        Self::with_readiness(Readiness::Always)
    }

    /// Create a mock with the given readiness script.
    pub const fn with_readiness(readiness: Readiness) -> Self {
        Self {
            readiness,
            frames: heapless::Vec::new(),
            frames_written: 0,
            polls: 0,
            enabled: false,
            enable_calls: 0,
            disable_calls: 0,
            swapped: false,
            underrun_clears: 0,
            gclk: GclkSetting::undivided(ClockSource::Osc0),
            clock_writes: 0,
            pending_polls: 0,
        }
    }
}

impl Default for MockDac {
    fn default() -> Self {
        Self::new()
    }
}

impl DacSink for MockDac {
    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        match self.readiness {
            Readiness::Always => true,
            Readiness::Stalled => false,
            Readiness::After(n) => {
                if self.pending_polls >= n {
                    true
                } else {
                    self.pending_polls += 1;
                    false
                }
            }
            Readiness::StallAfterFrames(n) => self.frames_written < n,
        }
    }

    fn write_frame(&mut self, ch0: i16, ch1: i16) {
        // A swapped DAC routes channel 0 to the right output.
        let frame = if self.swapped { (ch1, ch0) } else { (ch0, ch1) };
        let _ = self.frames.push(frame);
        self.frames_written += 1;
        self.pending_polls = 0;
    }

    fn enable(&mut self) {
        self.enabled = true;
        self.enable_calls += 1;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.disable_calls += 1;
    }

    fn swap_channels(&mut self) {
        self.swapped = !self.swapped;
    }

    fn is_swapped(&self) -> bool {
        self.swapped
    }

    fn clear_underrun(&mut self) {
        self.underrun_clears += 1;
    }
}

impl ClockControl for MockDac {
    fn set_clock(&mut self, setting: GclkSetting) {
        self.gclk = setting;
        self.clock_writes += 1;
    }

    fn clock(&self) -> GclkSetting {
        self.gclk
    }
}

/// Mock capture source producing a deterministic ramp.
pub struct MockAdc {
    /// Whether frames are available
    pub ready: bool,
    /// Next value of the ramp
    pub next: i16,
    /// Frames read so far
    pub frames_read: usize,
}

impl MockAdc {
    /// Create a ready source starting at `start`.
    pub fn new(start: i16) -> Self {
        Self {
            ready: true,
            next: start,
            frames_read: 0,
        }
    }
}

impl AdcSource for MockAdc {
    fn is_ready(&mut self) -> bool {
        self.ready
    }

    fn read_frame(&mut self) -> (i16, i16) {
        let left = self.next;
        self.next = self.next.wrapping_add(1);
        self.frames_read += 1;
        (left, left.wrapping_neg())
    }
}
