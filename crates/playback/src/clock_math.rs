//! ABDAC generic clock divider calculations.
//!
//! The bitstream DAC needs a generic clock of 256 × fs. The generic clock is
//! a reference oscillator or PLL, optionally divided:
//!
//! ```text
//!   source ──► [ ÷ 2 × (DIV + 1) ]  (DIVEN = 1)
//!          └─────────────────────►  (DIVEN = 0)
//! ```
//!
//! # Forward computation
//!
//!   div = bus_hz / (256 × fs)            (integer truncation)
//!   div > 1   → DIV = div / 2 − 1, DIVEN = 1
//!   div <= 1  → DIVEN = 0
//!
//! If `bus_hz < 256 × fs` the rate is unachievable. The caller clears DIVEN
//! and runs at `bus_hz / 256`, the fastest rate the source allows.
//!
//! # Inverse
//!
//!   DIVEN = 1 → gclk = bus_hz / (2 × (DIV + 1))
//!   DIVEN = 0 → gclk = bus_hz
//!
//! Both directions truncate. An odd `div` therefore rounds the divider down
//! and the achieved rate lands above the target; this is kept as is.
//!
//! # Standard rates
//!
//! No single source covers both rate families, so the nominal rates are
//! served from a fixed table. Relative error per source (%):
//!
//! ```text
//! Rate   | OSC1    | OSC0    | PLL0     | PLL1
//! 8000   |  -8.13  |  -2.34  | * 1.06   |  -2.34
//! 11025  | * 0.00  |   6.29  |   0.00   |  -5.52
//! 12000  |  -8.13  |  -2.34  | * 1.06   |  -2.34
//! 16000  |  37.81  |  46.48  |  -5.25   | *-2.34
//! 22050  | * 0.00  |   6.29  |  -8.33   |   6.29
//! 24000  |  -8.13  |  -2.34  | * 1.06   |  -2.34
//! 32000  | -31.09  | -26.76  |  -5.25   | *-2.34
//! 44100  | * 0.00  |   6.29  |  -8.33   |   6.29
//! 48000  |  -8.13  |  -2.34  | -15.78   | *-2.34
//! ```

use platform::{ClockSource, GclkSetting, ReferenceClocks};

use crate::error::MixerError;

/// Ratio between the DAC generic clock and the sample rate.
pub const OVERSAMPLE_FACTOR: u32 = 256;

/// Largest value of the 8-bit `DIV` field.
pub const DIV_FIELD_MAX: u8 = u8::MAX;

/// Divider field and enable bit, independent of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Divider {
    /// `DIV` field value.
    pub field: u8,
    /// `DIVEN` bit.
    pub enabled: bool,
}

impl Divider {
    /// Divider disabled: the source passes straight through.
    pub const BYPASS: Self = Self {
        field: 0,
        enabled: false,
    };

    /// Effective division ratio.
    #[allow(clippy::arithmetic_side_effects)] // Safety: field <= 255, ratio <= 512
    pub fn ratio(self) -> u32 {
        if self.enabled {
            2 * (u32::from(self.field) + 1)
        } else {
            1
        }
    }

    /// Combine with a source into a generic clock setting.
    pub const fn with_source(self, source: ClockSource) -> GclkSetting {
        GclkSetting {
            source,
            div: self.field,
            div_enabled: self.enabled,
        }
    }
}

impl From<GclkSetting> for Divider {
    fn from(setting: GclkSetting) -> Self {
        Self {
            field: setting.div,
            enabled: setting.div_enabled,
        }
    }
}

/// Compute the divider that brings `bus_hz` closest to `oversample × target_hz`.
///
/// # Errors
///
/// - [`MixerError::RateUnachievable`] if `bus_hz < oversample × target_hz`.
/// - [`MixerError::InvalidConfig`] if `target_hz` or `oversample` is zero.
// Safety: u32 × u32 fits u64; wanted > 0; div >= 2 before div / 2 - 1
#[allow(clippy::arithmetic_side_effects)]
pub fn compute_divider(
    bus_hz: u32,
    target_hz: u32,
    oversample: u32,
) -> Result<Divider, MixerError> {
    if target_hz == 0 || oversample == 0 {
        return Err(MixerError::InvalidConfig);
    }
    let wanted = u64::from(oversample) * u64::from(target_hz);
    if u64::from(bus_hz) < wanted {
        return Err(MixerError::RateUnachievable);
    }
    // wanted > 0 and bus_hz >= wanted, so div >= 1.
    let div = u64::from(bus_hz) / wanted;
    if div <= 1 {
        return Ok(Divider::BYPASS);
    }
    let field = div / 2 - 1;
    let field = match u8::try_from(field) {
        Ok(field) => field,
        Err(_) => {
            warn!(
                "divider {} exceeds field width, saturating at {}",
                field,
                DIV_FIELD_MAX
            );
            DIV_FIELD_MAX
        }
    };
    Ok(Divider {
        field,
        enabled: true,
    })
}

/// Generic clock frequency produced by `divider` from `bus_hz`.
pub fn actual_rate(bus_hz: u32, divider: Divider) -> u32 {
    // ratio() is never zero
    bus_hz.checked_div(divider.ratio()).unwrap_or(bus_hz)
}

/// Sample rate produced by `divider` from `bus_hz`.
pub fn actual_sample_rate(bus_hz: u32, divider: Divider, oversample: u32) -> u32 {
    actual_rate(bus_hz, divider)
        .checked_div(oversample)
        .unwrap_or(0)
}

/// Sample rate with the divider disabled: the fastest `bus_hz` allows.
pub fn degraded_sample_rate(bus_hz: u32, oversample: u32) -> u32 {
    actual_sample_rate(bus_hz, Divider::BYPASS, oversample)
}

/// Signed relative error of `actual` against `target`, in parts per million.
#[allow(clippy::arithmetic_side_effects)] // i64 holds any u32 difference times 1e6
pub fn relative_error_ppm(actual: u32, target: u32) -> i64 {
    if target == 0 {
        return 0;
    }
    (i64::from(actual) - i64::from(target)) * 1_000_000 / i64::from(target)
}

/// One row of the standard-rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardRate {
    /// Nominal sample rate.
    pub sample_rate_hz: u32,
    /// Chosen reference clock.
    pub source: ClockSource,
    /// Chosen divider.
    pub divider: Divider,
    /// Documented relative error, in hundredths of a percent.
    pub error_centi_percent: i16,
}

impl StandardRate {
    /// Generic clock setting for this row.
    pub const fn setting(&self) -> GclkSetting {
        self.divider.with_source(self.source)
    }
}

const fn row(
    sample_rate_hz: u32,
    source: ClockSource,
    field: u8,
    enabled: bool,
    error_centi_percent: i16,
) -> StandardRate {
    StandardRate {
        sample_rate_hz,
        source,
        divider: Divider { field, enabled },
        error_centi_percent,
    }
}

/// Minimal-error source and divider for each nominal rate.
pub const STANDARD_RATES: [StandardRate; 9] = [
    row(8_000, ClockSource::Pll0, 14, true, 106),  // PLL0 / 30 / 256
    row(11_025, ClockSource::Osc1, 1, true, 0),    // OSC1 / 4 / 256
    row(12_000, ClockSource::Pll0, 9, true, 106),  // PLL0 / 20 / 256
    row(16_000, ClockSource::Pll1, 5, true, -234), // PLL1 / 12 / 256
    row(22_050, ClockSource::Osc1, 0, true, 0),    // OSC1 / 2 / 256
    row(24_000, ClockSource::Pll0, 4, true, 106),  // PLL0 / 10 / 256
    row(32_000, ClockSource::Pll1, 2, true, -234), // PLL1 / 6 / 256
    row(44_100, ClockSource::Osc1, 0, false, 0),   // OSC1 / 256
    row(48_000, ClockSource::Pll1, 1, true, -234), // PLL1 / 4 / 256
];

/// Look up a nominal rate in [`STANDARD_RATES`].
///
/// # Errors
///
/// Returns [`MixerError::RateUnachievable`] for any rate not in the table.
pub fn lookup_standard_rate(sample_rate_hz: u32) -> Result<&'static StandardRate, MixerError> {
    STANDARD_RATES
        .iter()
        .find(|r| r.sample_rate_hz == sample_rate_hz)
        .ok_or(MixerError::RateUnachievable)
}

/// Sample rate a programmed setting produces with the given board clocks.
pub fn setting_sample_rate(clocks: &ReferenceClocks, setting: GclkSetting, oversample: u32) -> u32 {
    actual_sample_rate(clocks.hz(setting.source), Divider::from(setting), oversample)
}
