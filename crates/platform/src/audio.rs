//! Audio output abstraction
//!
//! The mixer never touches registers directly. It drives a [`DacSink`] for
//! sample frames, a [`ClockControl`] for the DAC generic clock, and an
//! optional [`AdcSource`] for the capture path. [`crate::abdac::Abdac`] is the
//! memory-mapped implementation; [`crate::mocks::MockDac`] is the in-memory one.

use crate::clock_config::ClockSource;

/// Sample sink with a per-frame readiness handshake.
pub trait DacSink {
    /// `true` when the peripheral accepts the next frame without overrun.
    fn is_ready(&mut self) -> bool;

    /// Write one frame. The caller must have observed [`is_ready`](Self::is_ready).
    fn write_frame(&mut self, ch0: i16, ch1: i16);

    /// Gate the peripheral clock on and enable the DAC.
    fn enable(&mut self);

    /// Disable the DAC and gate its clock off. Idempotent.
    fn disable(&mut self);

    /// Toggle the persistent left/right swap. Applies from the next frame.
    fn swap_channels(&mut self);

    /// Current left/right swap, as read back from the peripheral.
    fn is_swapped(&self) -> bool;

    /// Acknowledge a latched underrun so the next stream starts clean.
    fn clear_underrun(&mut self);
}

/// Generic clock generator feeding the DAC.
pub trait ClockControl {
    /// Program source select, divider and divider-enable.
    fn set_clock(&mut self, setting: GclkSetting);

    /// Read back the currently programmed setting.
    fn clock(&self) -> GclkSetting;
}

/// Capture-side counterpart of [`DacSink`].
pub trait AdcSource {
    /// `true` when a captured frame is waiting.
    fn is_ready(&mut self) -> bool;

    /// Read one captured frame.
    fn read_frame(&mut self) -> (i16, i16);
}

/// Generic clock control word for the DAC clock generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GclkSetting {
    /// Oscillator or PLL feeding the divider.
    pub source: ClockSource,
    /// Divider field; output = source / (2 × (div + 1)) when enabled.
    pub div: u8,
    /// Divider enable. When clear the source passes through undivided.
    pub div_enabled: bool,
}

impl GclkSetting {
    /// Undivided clock taken straight from `source`.
    pub const fn undivided(source: ClockSource) -> Self {
        Self {
            source,
            div: 0,
            div_enabled: false,
        }
    }
}

/// Requested output format, as passed to `start` / `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u8,
    /// Bit depth (8 or 16)
    pub bit_depth: u8,
    /// Swap left and right on output
    pub swap_channels: bool,
}

impl AudioConfig {
    /// `true` if channel count and bit depth are supported by the ABDAC path.
    pub fn is_supported(&self) -> bool {
        self.sample_rate > 0 && matches!(self.channels, 1 | 2) && matches!(self.bit_depth, 8 | 16)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            swap_channels: false,
        }
    }
}

/// Configuration actually applied to the DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DacConfig {
    /// Format the caller asked for.
    pub requested: AudioConfig,
    /// Programmed generic clock.
    pub clock: GclkSetting,
    /// Sample rate the programmed clock really produces.
    pub actual_rate_hz: u32,
}

impl DacConfig {
    /// Channel count of the active format.
    pub fn channels(&self) -> u8 {
        self.requested.channels
    }

    /// Bits per sample of the active format.
    pub fn bit_depth(&self) -> u8 {
        self.requested.bit_depth
    }
}
