//! Hardware Abstraction Layer (HAL) for the ABDAC audio mixer
//!
//! This crate provides trait-based abstractions for the audio output
//! hardware, enabling development and testing without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Producer (application, decoder, USB mass-storage reader)
//!         ↓
//! Mixer (playback crate: pool, pipeline, volume)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! ABDAC registers + power manager generic clock
//! ```
//!
//! # Contents
//!
//! - [`DacSink`] / [`ClockControl`] / [`AdcSource`] - hardware seams
//! - [`abdac`] - register map and memory-mapped [`abdac::Abdac`] adapter
//! - [`clock_config`] - reference oscillators and PLLs
//! - [`audio_types`] - `Volume` and `DacMask` newtypes
//! - [`mocks`] - in-memory adapters (`std` feature or tests)
//!
//! # Features
//!
//! - `std`: Enable the mock adapters for host tests
//! - `defmt`: Derive `defmt::Format` on all platform types
//!
//! # Example
//!
//! ```no_run
//! use platform::DacSink;
//!
//! fn write_silence<S: DacSink>(sink: &mut S) {
//!     while !sink.is_ready() {}
//!     sink.write_frame(0, 0);
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod abdac;
pub mod audio;
pub mod audio_types;
pub mod clock_config;
pub mod mocks;

// Re-export main high-level traits
pub use audio::{AdcSource, AudioConfig, ClockControl, DacConfig, DacSink, GclkSetting};
pub use audio_types::{DacMask, OutOfRangeError, Volume};
pub use clock_config::{ClockSource, ReferenceClocks};
