//! Output volume and mute.
//!
//! Volume is linear over `u8`:
//! - `0`   = silent
//! - `255` = unity gain
//!
//! Scaling happens on the output path, one sample at a time, so the
//! producer's buffer contents are never modified:
//!
//! ```text
//! out = sample × volume / 255      (muted → 0)
//! ```
//!
//! | `volume` | Gain      |
//! |----------|-----------|
//! | 255      | 1.0       |
//! | 128      | ~0.5      |
//! | 0        | silent    |

use platform::Volume;

/// Default increment for [`VolumeControl::increase`] / [`VolumeControl::decrease`].
pub const DEFAULT_VOLUME_STEP: u8 = 8;

/// Volume level, mute flag and step size.
///
/// Muting is orthogonal to the level: unmuting restores exactly the volume
/// that was set before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VolumeControl {
    volume: Volume,
    muted: bool,
    step: u8,
}

impl VolumeControl {
    /// Unity gain, unmuted, default step.
    pub const fn new() -> Self {
        Self::with_step(Volume::MAX, DEFAULT_VOLUME_STEP)
    }

    /// Start at `volume`, moving by `step` per increase/decrease.
    pub const fn with_step(volume: Volume, step: u8) -> Self {
        Self {
            volume,
            muted: false,
            step,
        }
    }

    /// Raise by one step, saturating at 255.
    pub fn increase(&mut self) -> Volume {
        self.volume = self.volume.raised(self.step);
        self.volume
    }

    /// Lower by one step, saturating at 0.
    pub fn decrease(&mut self) -> Volume {
        self.volume = self.volume.lowered(self.step);
        self.volume
    }

    /// Set the level directly.
    pub fn set(&mut self, volume: Volume) {
        self.volume = volume;
    }

    /// Set the level from a wider integer; values above 255 clamp to 255.
    pub fn set_clamped(&mut self, level: u32) -> Volume {
        self.volume = Volume::clamped(level);
        self.volume
    }

    /// Stored level, regardless of mute.
    pub fn get(&self) -> Volume {
        self.volume
    }

    /// Step used by `increase` and `decrease`.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Mute or unmute. The stored level is untouched.
    pub fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// `true` while muted.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Scale one outgoing sample.
    #[allow(clippy::arithmetic_side_effects)] // Safety: |i16| × 255 fits i32; / 255 is non-zero
    #[allow(clippy::cast_possible_truncation)] // Safety: |result| <= |sample|, fits i16
    pub fn scale(&self, sample: i16) -> i16 {
        if self.muted {
            return 0;
        }
        let gain = i32::from(self.volume.get());
        (i32::from(sample) * gain / i32::from(u8::MAX)) as i16
    }

    /// Scale a frame, both channels.
    pub fn scale_frame(&self, (ch0, ch1): (i16, i16)) -> (i16, i16) {
        (self.scale(ch0), self.scale(ch1))
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new()
    }
}
