//! Reference clocks available to the ABDAC generic clock.
//!
//! The generic clock can be fed from either crystal oscillator or either PLL.
//! The board values below are the EVK1104 defaults:
//!
//! ```text
//! OSC0   12 000 000 Hz
//! OSC1   11 289 600 Hz   (44.1 kHz family: 256 x 44 100)
//! PLL0   62 092 800 Hz   (OSC1 x 5.5)
//! PLL1   48 000 000 Hz   (OSC0 x 4)
//! ```
//!
//! The bitstream DAC needs a clock of 256 × fs, so no single source covers
//! both the 44.1 kHz and the 48 kHz families exactly.

/// Clock source feeding the DAC generic clock.
///
/// Encoded in the generic clock control word by two select bits:
/// `PLLSEL` chooses oscillator (0) or PLL (1), `OSCSEL` picks which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// Crystal oscillator 0.
    Osc0,
    /// Crystal oscillator 1.
    Osc1,
    /// PLL 0.
    Pll0,
    /// PLL 1.
    Pll1,
}

impl ClockSource {
    /// All sources, in select-bit order.
    pub const ALL: [ClockSource; 4] = [Self::Osc0, Self::Osc1, Self::Pll0, Self::Pll1];

    /// `PLLSEL` bit value for this source.
    pub const fn pll_select(self) -> bool {
        matches!(self, Self::Pll0 | Self::Pll1)
    }

    /// `OSCSEL` bit value for this source.
    pub const fn osc_select(self) -> bool {
        matches!(self, Self::Osc1 | Self::Pll1)
    }

    /// Decode the two select bits.
    pub const fn from_select_bits(pll_select: bool, osc_select: bool) -> Self {
        match (pll_select, osc_select) {
            (false, false) => Self::Osc0,
            (false, true) => Self::Osc1,
            (true, false) => Self::Pll0,
            (true, true) => Self::Pll1,
        }
    }

    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Osc0 => "OSC0",
            Self::Osc1 => "OSC1",
            Self::Pll0 => "PLL0",
            Self::Pll1 => "PLL1",
        }
    }
}

/// Frequencies of the four reference clocks, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReferenceClocks {
    /// OSC0 frequency.
    pub osc0_hz: u32,
    /// OSC1 frequency.
    pub osc1_hz: u32,
    /// PLL0 output frequency.
    pub pll0_hz: u32,
    /// PLL1 output frequency.
    pub pll1_hz: u32,
}

impl ReferenceClocks {
    /// EVK1104 board clocks.
    pub const EVK1104: Self = Self {
        osc0_hz: 12_000_000,
        osc1_hz: 11_289_600,
        pll0_hz: 62_092_800,
        pll1_hz: 48_000_000,
    };

    /// Frequency of `source` in Hz.
    pub const fn hz(&self, source: ClockSource) -> u32 {
        match source {
            ClockSource::Osc0 => self.osc0_hz,
            ClockSource::Osc1 => self.osc1_hz,
            ClockSource::Pll0 => self.pll0_hz,
            ClockSource::Pll1 => self.pll1_hz,
        }
    }
}

impl Default for ReferenceClocks {
    fn default() -> Self {
        Self::EVK1104
    }
}
