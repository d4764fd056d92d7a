//! Audio bitstream DAC (ABDAC) register map and memory-mapped adapter.
//!
//! Reference: AVR32 UC3A ABDAC chapter; application note AVR32120.
//!
//! # Register block
//!
//! | Offset | Name | Access | Content |
//! |--------|------|--------|---------|
//! | 0x00 | SDR | W  | channel 0 in bits 15:0, channel 1 in bits 31:16 |
//! | 0x08 | CR  | RW | `EN` bit 31, `SWAP` bit 30 |
//! | 0x0C | IMR | R  | interrupt mask |
//! | 0x10 | IER | W  | interrupt enable |
//! | 0x14 | IDR | W  | interrupt disable |
//! | 0x18 | ICR | W  | interrupt clear |
//! | 0x1C | ISR | R  | `TX_READY` bit 5, `UNDERRUN` bit 4 |
//!
//! # Generic clock control word (power manager `GCCTRL[ABDAC]`)
//!
//! | Bits | Field | Meaning |
//! |------|-------|---------|
//! | 0    | OSCSEL | oscillator / PLL number |
//! | 1    | PLLSEL | 0 = oscillator, 1 = PLL |
//! | 2    | CEN    | clock enable |
//! | 4    | DIVEN  | divider enable |
//! | 15:8 | DIV    | output = source / (2 × (DIV + 1)) |

use core::ptr;

use crate::audio::{ClockControl, DacSink, GclkSetting};
use crate::clock_config::ClockSource;

// ---------------------------------------------------------------------------
// Register offsets (bytes)
// ---------------------------------------------------------------------------

/// Sample data register.
pub const REG_SDR: usize = 0x00;
/// Control register.
pub const REG_CR: usize = 0x08;
/// Interrupt mask register.
pub const REG_IMR: usize = 0x0C;
/// Interrupt enable register.
pub const REG_IER: usize = 0x10;
/// Interrupt disable register.
pub const REG_IDR: usize = 0x14;
/// Interrupt clear register.
pub const REG_ICR: usize = 0x18;
/// Interrupt status register.
pub const REG_ISR: usize = 0x1C;

/// Size of the register block in 32-bit words.
pub const REGISTER_WORDS: usize = 8;

// ---------------------------------------------------------------------------
// Bit fields
// ---------------------------------------------------------------------------

/// `CR.EN`: DAC enable.
pub const CR_EN: u32 = 1 << 31;
/// `CR.SWAP`: swap channel 0 and channel 1.
pub const CR_SWAP: u32 = 1 << 30;

/// `ISR.TX_READY`: SDR can accept the next frame.
pub const ISR_TX_READY: u32 = 1 << 5;
/// `ISR.UNDERRUN`: SDR was not written in time.
pub const ISR_UNDERRUN: u32 = 1 << 4;

/// Bit offset of channel 1 in `SDR`.
pub const SDR_CHANNEL1_SHIFT: u32 = 16;

/// `GCCTRL.OSCSEL`.
pub const GCLK_OSCSEL: u32 = 1 << 0;
/// `GCCTRL.PLLSEL`.
pub const GCLK_PLLSEL: u32 = 1 << 1;
/// `GCCTRL.CEN`.
pub const GCLK_CEN: u32 = 1 << 2;
/// `GCCTRL.DIVEN`.
pub const GCLK_DIVEN: u32 = 1 << 4;
/// Bit offset of `GCCTRL.DIV`.
pub const GCLK_DIV_SHIFT: u32 = 8;
/// Mask of `GCCTRL.DIV` after shifting.
pub const GCLK_DIV_MASK: u32 = 0xFF;

/// Pack one frame into an `SDR` word.
#[allow(clippy::cast_sign_loss)] // bit reinterpretation
pub const fn pack_frame(ch0: i16, ch1: i16) -> u32 {
    (ch0 as u16 as u32) | ((ch1 as u16 as u32) << SDR_CHANNEL1_SHIFT)
}

/// Encode source, divider and divider-enable into a `GCCTRL` word.
///
/// `CEN` is not part of the setting and is left clear.
pub const fn encode_gclk(setting: GclkSetting) -> u32 {
    let mut word = (setting.div as u32) << GCLK_DIV_SHIFT;
    if setting.div_enabled {
        word |= GCLK_DIVEN;
    }
    if setting.source.pll_select() {
        word |= GCLK_PLLSEL;
    }
    if setting.source.osc_select() {
        word |= GCLK_OSCSEL;
    }
    word
}

/// Decode a `GCCTRL` word, ignoring `CEN`.
#[allow(clippy::cast_possible_truncation)] // masked to 8 bits
pub const fn decode_gclk(word: u32) -> GclkSetting {
    GclkSetting {
        source: ClockSource::from_select_bits(word & GCLK_PLLSEL != 0, word & GCLK_OSCSEL != 0),
        div: ((word >> GCLK_DIV_SHIFT) & GCLK_DIV_MASK) as u8,
        div_enabled: word & GCLK_DIVEN != 0,
    }
}

// ---------------------------------------------------------------------------
// Memory-mapped adapter
// ---------------------------------------------------------------------------

/// Memory-mapped ABDAC plus its generic clock control word.
pub struct Abdac {
    base: *mut u32,
    gcctrl: *mut u32,
}

impl Abdac {
    /// Wrap the ABDAC register block at `base` and the generic clock control
    /// word at `gcctrl`.
    ///
    /// # Safety
    ///
    /// `base` must point to a valid, 4-byte aligned ABDAC register block of
    /// [`REGISTER_WORDS`] words and `gcctrl` to the ABDAC generic clock
    /// control word. Both must stay valid for the lifetime of the adapter and
    /// must not be driven through another handle concurrently.
    pub const unsafe fn new(base: *mut u32, gcctrl: *mut u32) -> Self {
        Self { base, gcctrl }
    }

    #[allow(clippy::arithmetic_side_effects)] // offsets are register constants < 0x20
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `new` guarantees `base` covers REGISTER_WORDS aligned words;
        // every offset passed here is one of the REG_* constants.
        unsafe { ptr::read_volatile(self.base.add(offset / 4)) }
    }

    #[allow(clippy::arithmetic_side_effects)] // offsets are register constants < 0x20
    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: see `read`.
        unsafe { ptr::write_volatile(self.base.add(offset / 4), value) }
    }

    fn read_gclk(&self) -> u32 {
        // SAFETY: `new` guarantees `gcctrl` is a valid control word.
        unsafe { ptr::read_volatile(self.gcctrl) }
    }

    fn write_gclk(&mut self, value: u32) {
        // SAFETY: see `read_gclk`.
        unsafe { ptr::write_volatile(self.gcctrl, value) }
    }

    /// `true` when `CR.EN` is set.
    pub fn is_enabled(&self) -> bool {
        self.read(REG_CR) & CR_EN != 0
    }
}

// SAFETY: `Abdac` is the only handle to its register block and clock control
// word (see `new`), so moving it to another context moves exclusive access
// with it.
unsafe impl Send for Abdac {}

impl DacSink for Abdac {
    fn is_ready(&mut self) -> bool {
        self.read(REG_ISR) & ISR_TX_READY != 0
    }

    fn write_frame(&mut self, ch0: i16, ch1: i16) {
        self.write(REG_SDR, pack_frame(ch0, ch1));
    }

    fn enable(&mut self) {
        let gclk = self.read_gclk();
        self.write_gclk(gclk | GCLK_CEN);
        let cr = self.read(REG_CR);
        self.write(REG_CR, cr | CR_EN);
    }

    fn disable(&mut self) {
        let cr = self.read(REG_CR);
        self.write(REG_CR, cr & !CR_EN);
        let gclk = self.read_gclk();
        self.write_gclk(gclk & !GCLK_CEN);
    }

    fn swap_channels(&mut self) {
        let cr = self.read(REG_CR);
        self.write(REG_CR, cr ^ CR_SWAP);
    }

    fn is_swapped(&self) -> bool {
        self.read(REG_CR) & CR_SWAP != 0
    }

    fn clear_underrun(&mut self) {
        self.write(REG_ICR, ISR_UNDERRUN);
    }
}

impl ClockControl for Abdac {
    fn set_clock(&mut self, setting: GclkSetting) {
        let cen = self.read_gclk() & GCLK_CEN;
        self.write_gclk(encode_gclk(setting) | cen);
    }

    fn clock(&self) -> GclkSetting {
        decode_gclk(self.read_gclk())
    }
}
