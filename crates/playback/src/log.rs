//! Logging shim.
//!
//! Hardware builds log through `defmt` (feature `defmt`), host builds through
//! `tracing` (feature `tracing`). With neither feature the macros compile to
//! nothing but still type-check their arguments.
//!
//! Arguments must implement both `defmt::Format` and `Display`; log enums
//! through their `as_str()` helpers.
#![allow(unused_macros)]

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        let _ = ::core::format_args!($($arg)+);
    }};
}

macro_rules! warn {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        let _ = ::core::format_args!($($arg)+);
    }};
}
