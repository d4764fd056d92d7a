//! Audio domain newtypes for compile-time safety.
//!
//! - `Volume`: linear 0–255 output level, 255 = unity gain
//! - `DacMask`: which DACs the mixer drives

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── Volume ───────────────────────────────────────────────────────────────────

/// Linear output volume, 0 (silent) to 255 (unity gain).
///
/// Every `u8` is a valid volume; wider inputs go through
/// [`Volume::clamped`] or [`Volume::try_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct Volume(u8);

impl Volume {
    /// Silence.
    pub const MIN: Self = Self(0);

    /// Unity gain.
    pub const MAX: Self = Self(u8::MAX);

    /// Create a `Volume` from a raw level.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// Create a `Volume`, clamping values above 255 to 255.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // min(255) guarantees the value fits
    pub fn clamped(level: u32) -> Self {
        Self(level.min(u32::from(u8::MAX)) as u8)
    }

    /// Create a `Volume`, returning an error if `level > 255`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `level > 255`.
    pub fn try_new(level: u32) -> Result<Self, OutOfRangeError> {
        u8::try_from(level).map(Self).map_err(|_| OutOfRangeError {
            value: level,
            min: 0,
            max: u32::from(u8::MAX),
        })
    }

    /// Return the raw level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Raise by `step`, saturating at 255.
    #[must_use]
    pub const fn raised(self, step: u8) -> Self {
        Self(self.0.saturating_add(step))
    }

    /// Lower by `step`, saturating at 0.
    #[must_use]
    pub const fn lowered(self, step: u8) -> Self {
        Self(self.0.saturating_sub(step))
    }
}

// ── DacMask ──────────────────────────────────────────────────────────────────

/// Bit mask selecting DACs handled by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct DacMask(u32);

impl DacMask {
    /// No DAC.
    pub const NONE: Self = Self(0);

    /// On-chip audio bitstream DAC.
    pub const ABDAC: Self = Self(1 << 0);

    /// External I²S codec (interface only, not driven by this mixer).
    pub const EXTERNAL_CODEC: Self = Self(1 << 1);

    /// `true` if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Set union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Remove every bit of `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_saturates_at_max() {
        assert_eq!(Volume::new(250).raised(8), Volume::MAX);
    }

    #[test]
    fn lowered_saturates_at_zero() {
        assert_eq!(Volume::new(3).lowered(8), Volume::MIN);
    }

    #[test]
    fn mask_union_and_difference() {
        let both = DacMask::ABDAC.union(DacMask::EXTERNAL_CODEC);
        assert!(both.contains(DacMask::ABDAC));
        let rest = both.difference(DacMask::ABDAC);
        assert!(!rest.contains(DacMask::ABDAC));
        assert!(rest.contains(DacMask::EXTERNAL_CODEC));
    }

    #[test]
    fn empty_mask_contains_nothing() {
        assert!(!DacMask::NONE.contains(DacMask::NONE));
        assert!(!DacMask::NONE.contains(DacMask::ABDAC));
    }
}
