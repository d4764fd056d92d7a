//! Bounded busy-wait for hardware readiness.
//!
//! The DAC ready flag is polled in a tight loop on the caller's context.
//! Every wait is bounded so that `flush` and `stop` can always make progress
//! against a stalled peripheral.

use crate::error::MixerError;

/// Polls allowed per frame before the DAC is considered stalled.
pub const ABDAC_TIMEOUT_POLLS: u32 = 10_000;

/// Maximum number of polls per wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Failed polls tolerated before `Timeout`.
    pub max_polls: u32,
}

impl RetryPolicy {
    /// Policy with an explicit budget.
    pub const fn new(max_polls: u32) -> Self {
        Self { max_polls }
    }

    /// Spin until `ready()` returns `true`.
    ///
    /// Returns the number of polls it took.
    ///
    /// # Errors
    ///
    /// `Timeout` once `max_polls` polls have failed.
    pub fn wait_until<F>(&self, mut ready: F) -> Result<u32, MixerError>
    where
        F: FnMut() -> bool,
    {
        let mut polls: u32 = 0;
        loop {
            if ready() {
                return Ok(polls.saturating_add(1));
            }
            polls = polls.saturating_add(1);
            if polls >= self.max_polls {
                warn!("hardware not ready after {} polls", polls);
                return Err(MixerError::Timeout);
            }
            core::hint::spin_loop();
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(ABDAC_TIMEOUT_POLLS)
    }
}
