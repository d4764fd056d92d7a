//! Mixer shared between the main loop and interrupt or resume handlers.
//!
//! A blocking `embassy_sync` mutex picks the critical-section flavour
//! (`CriticalSectionRawMutex` on hardware, `NoopRawMutex` in tests). The
//! mixer itself sits in a `RefCell`; a handler that runs while the main loop
//! is already inside the mixer gets `InvalidState` instead of a panic.
//!
//! Every wait inside the mixer is bounded, so a `flush` or `stop` issued from
//! a resume handler always returns even when the DAC has stalled.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{ClockControl, DacSink};

use crate::error::MixerError;
use crate::mixer::{AudioMixer, MixerStatus};

/// [`AudioMixer`] behind a blocking mutex.
pub struct SharedMixer<M: RawMutex, P, const N: usize, const SAMPLES: usize> {
    inner: Mutex<M, RefCell<AudioMixer<P, N, SAMPLES>>>,
}

impl<M, P, const N: usize, const SAMPLES: usize> SharedMixer<M, P, N, SAMPLES>
where
    M: RawMutex,
    P: DacSink + ClockControl,
{
    /// Wrap a mixer.
    pub const fn new(mixer: AudioMixer<P, N, SAMPLES>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(mixer)),
        }
    }

    /// Run `f` with exclusive access to the mixer.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the mixer is already borrowed further up the stack.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut AudioMixer<P, N, SAMPLES>) -> R,
    ) -> Result<R, MixerError> {
        self.inner.lock(|cell| match cell.try_borrow_mut() {
            Ok(mut mixer) => Ok(f(&mut mixer)),
            Err(_) => {
                warn!("mixer re-entered");
                Err(MixerError::InvalidState)
            }
        })
    }

    /// Flush from any context.
    ///
    /// # Errors
    ///
    /// `InvalidState` on re-entry, otherwise see [`AudioMixer::flush`].
    pub fn flush(&self, force: bool) -> Result<(), MixerError> {
        self.with(|m| m.flush(force))?
    }

    /// Stop from any context.
    ///
    /// # Errors
    ///
    /// `InvalidState` on re-entry.
    pub fn stop(&self) -> Result<(), MixerError> {
        self.with(|m| m.stop())
    }

    /// Mute or unmute from any context.
    ///
    /// # Errors
    ///
    /// `InvalidState` on re-entry.
    pub fn mute(&self, muted: bool) -> Result<(), MixerError> {
        self.with(|m| m.mute(muted))
    }

    /// Status snapshot.
    ///
    /// # Errors
    ///
    /// `InvalidState` on re-entry.
    pub fn status(&self) -> Result<MixerStatus, MixerError> {
        self.with(|m| m.status())
    }

    /// Unwrap the mixer.
    pub fn into_inner(self) -> AudioMixer<P, N, SAMPLES> {
        self.inner.into_inner().into_inner()
    }
}
