//! Mixer error type.
//!
//! Every failure in this crate is local and recoverable: the caller retries,
//! reconfigures, or accepts a degraded result. Nothing here is fatal.

use thiserror_no_std::Error;

/// Errors returned by the pool, pipeline and mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerError {
    /// The reference clock cannot produce the requested rate even undivided.
    /// The pipeline degrades to the undivided rate instead of aborting.
    #[error("sample rate not achievable from the reference clock")]
    RateUnachievable,
    /// No free buffer in the pool. Retry after the pipeline drains one.
    #[error("no free sample buffer")]
    PoolExhausted,
    /// The hardware did not become ready within the retry budget.
    #[error("timed out waiting for hardware readiness")]
    Timeout,
    /// The operation needs a running pipeline.
    #[error("output pipeline is not running")]
    NotRunning,
    /// The operation is not valid in the current state.
    #[error("operation not valid in the current state")]
    InvalidState,
    /// Format, geometry or length outside what the hardware supports.
    #[error("unsupported configuration")]
    InvalidConfig,
    /// `start` was called with no DAC enabled in the mask.
    #[error("no DAC enabled")]
    NoDacEnabled,
}

impl MixerError {
    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateUnachievable => "RateUnachievable",
            Self::PoolExhausted => "PoolExhausted",
            Self::Timeout => "Timeout",
            Self::NotRunning => "NotRunning",
            Self::InvalidState => "InvalidState",
            Self::InvalidConfig => "InvalidConfig",
            Self::NoDacEnabled => "NoDacEnabled",
        }
    }
}
