//! Audio output mixer for the ABDAC bitstream DAC: buffer pool, clock
//! divider, readiness-paced output pipeline, volume and mute.
//!
//! # Data flow
//!
//! ```text
//! producer ──acquire_buffer──► BufferPool ──submit──► OutputPipeline
//!                                  ▲                        │ frame by frame
//!                                  └──────release───────────┤
//!                                                           ▼
//!                                          VolumeControl ──► DacSink
//! ```
//!
//! # Features
//!
//! - `defmt`: log through `defmt` and derive `defmt::Format` (hardware builds)
//! - `tracing`: log through `tracing` (host builds)
//! - `std`: host build marker
#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]

#[macro_use]
mod log;

pub mod clock_math;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod pool;
pub mod retry;
pub mod shared;
pub mod volume;

pub use engine::{ClockMode, OutputPipeline, PipelineSettings, PipelineState, RateOutcome};
pub use error::MixerError;
pub use mixer::{AudioMixer, MixerConfig, MixerStatus, OutputStrategy, SubmitError};
pub use pool::{BufferHandle, BufferPool, BufferState, Refused};
pub use retry::RetryPolicy;
pub use shared::SharedMixer;
pub use volume::VolumeControl;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    /// Buffer pool tests
    mod pool_tests {
        use crate::error::MixerError;
        use crate::pool::{BufferPool, BufferState};

        #[test]
        fn test_pool_exhausts_after_buffer_count() {
            let mut pool: BufferPool<4, 16> = BufferPool::new();
            pool.configure(3, 16).expect("geometry fits");
            let held: Vec<_> = (0..3).map(|_| pool.acquire().expect("free buffer")).collect();
            assert_eq!(held.len(), 3);
            assert_eq!(pool.acquire(), Err(MixerError::PoolExhausted));
        }

        #[test]
        fn test_one_release_allows_exactly_one_acquire() {
            let mut pool: BufferPool<2, 8> = BufferPool::new();
            let a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            pool.begin_drain(&a, 8).unwrap();
            pool.release(a).expect("draining buffer releases");
            let c = pool.acquire().expect("one buffer was freed");
            assert_eq!(c.index(), 0, "freed slot is reused");
            assert_eq!(pool.acquire(), Err(MixerError::PoolExhausted));
        }

        #[test]
        fn test_release_of_filled_buffer_is_refused() {
            let mut pool: BufferPool<2, 8> = BufferPool::new();
            let h = pool.acquire().unwrap();
            let refused = pool.release(h).expect_err("Filled is not Draining");
            assert_eq!(refused.error, MixerError::InvalidState);
            assert_eq!(pool.state(refused.handle.index()), Some(BufferState::Filled));
        }

        #[test]
        fn test_states_follow_lifecycle() {
            let mut pool: BufferPool<1, 8> = BufferPool::new();
            assert_eq!(pool.state(0), Some(BufferState::Free));
            let h = pool.acquire().unwrap();
            assert_eq!(pool.state(0), Some(BufferState::Filled));
            pool.begin_drain(&h, 4).unwrap();
            assert_eq!(pool.state(0), Some(BufferState::Draining));
            assert_eq!(pool.begin_drain(&h, 4), Err(MixerError::InvalidState));
            pool.release(h).unwrap();
            assert_eq!(pool.state(0), Some(BufferState::Free));
        }

        #[test]
        fn test_begin_drain_clamps_length() {
            let mut pool: BufferPool<1, 8> = BufferPool::new();
            let h = pool.acquire().unwrap();
            assert_eq!(pool.begin_drain(&h, 100), Ok(8));
            assert_eq!(pool.filled_len(&h), 8);
        }

        #[test]
        fn test_discard_returns_filled_buffer() {
            let mut pool: BufferPool<1, 8> = BufferPool::new();
            let h = pool.acquire().unwrap();
            pool.discard(h).unwrap();
            assert_eq!(pool.free_count(), 1);
        }

        #[test]
        fn test_configure_rejects_oversized_geometry() {
            let mut pool: BufferPool<2, 8> = BufferPool::new();
            assert_eq!(pool.configure(3, 8), Err(MixerError::InvalidConfig));
            assert_eq!(pool.configure(2, 9), Err(MixerError::InvalidConfig));
            assert_eq!(pool.configure(0, 8), Err(MixerError::InvalidConfig));
            assert_eq!(pool.buffer_count(), 2);
        }

        #[test]
        fn test_configure_refused_while_buffer_held() {
            let mut pool: BufferPool<2, 8> = BufferPool::new();
            let h = pool.acquire().unwrap();
            assert_eq!(pool.configure(1, 4), Err(MixerError::InvalidState));
            pool.discard(h).unwrap();
            pool.configure(1, 4).unwrap();
            let h = pool.acquire().unwrap();
            assert_eq!(pool.samples_mut(&h).len(), 4);
        }

        #[test]
        fn test_acquire_sized_checks_buffer_size() {
            let mut pool: BufferPool<2, 8> = BufferPool::new();
            pool.configure(2, 6).unwrap();
            assert_eq!(pool.acquire_sized(7), Err(MixerError::InvalidConfig));
            assert!(pool.acquire_sized(6).is_ok());
        }

        #[test]
        fn test_state_outside_geometry_is_none() {
            let mut pool: BufferPool<4, 8> = BufferPool::new();
            pool.configure(2, 8).unwrap();
            assert_eq!(pool.state(2), None);
            assert_eq!(pool.capacity(), (4, 8));
        }
    }

    /// Output pipeline tests
    mod engine_tests {
        use platform::mocks::{MockDac, Readiness};
        use platform::{AudioConfig, ClockSource, GclkSetting};

        use crate::engine::{
            ClockMode, OutputPipeline, PipelineSettings, PipelineState, RateOutcome,
        };
        use crate::error::MixerError;
        use crate::pool::{BufferPool, BufferState};
        use crate::retry::RetryPolicy;
        use crate::volume::VolumeControl;

        type Pool = BufferPool<2, 8>;

        fn stereo(rate: u32) -> AudioConfig {
            AudioConfig {
                sample_rate: rate,
                ..AudioConfig::default()
            }
        }

        fn settings(clock_mode: ClockMode, max_polls: u32) -> PipelineSettings {
            PipelineSettings {
                clock_mode,
                retry: RetryPolicy::new(max_polls),
                ..PipelineSettings::new()
            }
        }

        fn running(dac: &mut MockDac, audio: AudioConfig) -> OutputPipeline<2> {
            let mode = ClockMode::Divided {
                source: ClockSource::Osc1,
            };
            let mut p = OutputPipeline::new(settings(mode, 5));
            p.start(dac, audio).expect("start");
            p
        }

        /// Queue one buffer holding `samples`, returning its slot.
        fn queue(
            p: &mut OutputPipeline<2>,
            pool: &mut Pool,
            samples: &[i16],
            frames: usize,
        ) -> usize {
            let h = pool.acquire().expect("free buffer");
            pool.samples_mut(&h)[..samples.len()].copy_from_slice(samples);
            let idx = h.index();
            p.enqueue(pool, h, frames).expect("enqueue");
            idx
        }

        #[test]
        fn test_pipeline_starts_stopped() {
            let p: OutputPipeline<2> = OutputPipeline::default();
            assert_eq!(p.state(), PipelineState::Stopped);
            assert!(p.config().is_none());
        }

        #[test]
        fn test_start_programs_clock_and_enables_dac() {
            let mut dac = MockDac::new();
            let p = running(&mut dac, stereo(44_100));
            assert_eq!(p.state(), PipelineState::Running);
            assert!(dac.enabled);
            assert_eq!(dac.gclk, GclkSetting::undivided(ClockSource::Osc1));
            assert_eq!(p.config().unwrap().actual_rate_hz, 44_100);
        }

        #[test]
        fn test_start_while_running_is_invalid_state() {
            let mut dac = MockDac::new();
            let mut p = running(&mut dac, stereo(44_100));
            assert_eq!(p.start(&mut dac, stereo(22_050)), Err(MixerError::InvalidState));
            assert_eq!(dac.enable_calls, 1);
        }

        #[test]
        fn test_configure_then_start() {
            let mut dac = MockDac::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            p.configure(&mut dac, stereo(22_050)).unwrap();
            assert_eq!(p.state(), PipelineState::Configured);
            assert!(!dac.enabled);
            p.start(&mut dac, stereo(22_050)).unwrap();
            assert_eq!(p.state(), PipelineState::Running);
        }

        #[test]
        fn test_unsupported_format_is_rejected() {
            let mut dac = MockDac::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            let bad = AudioConfig {
                channels: 6,
                ..AudioConfig::default()
            };
            assert_eq!(p.start(&mut dac, bad), Err(MixerError::InvalidConfig));
            assert_eq!(p.state(), PipelineState::Stopped);
            assert_eq!(dac.clock_writes, 0);
        }

        #[test]
        fn test_unachievable_rate_degrades_and_still_runs() {
            let mut dac = MockDac::new();
            let mode = ClockMode::Divided {
                source: ClockSource::Osc0,
            };
            let mut p: OutputPipeline<2> = OutputPipeline::new(settings(mode, 5));
            let outcome = p.start(&mut dac, stereo(48_000)).unwrap();
            assert_eq!(outcome, RateOutcome::Degraded { actual_hz: 46_875 });
            assert_eq!(p.state(), PipelineState::Running);
            assert_eq!(dac.gclk, GclkSetting::undivided(ClockSource::Osc0));
        }

        #[test]
        fn test_standard_rate_table_selects_source() {
            let mut dac = MockDac::new();
            let mut p: OutputPipeline<2> =
                OutputPipeline::new(settings(ClockMode::StandardRates, 5));
            let outcome = p.start(&mut dac, stereo(16_000)).unwrap();
            assert_eq!(outcome, RateOutcome::Applied { actual_hz: 15_625 });
            assert_eq!(
                dac.gclk,
                GclkSetting {
                    source: ClockSource::Pll1,
                    div: 5,
                    div_enabled: true
                }
            );
        }

        #[test]
        fn test_non_standard_rate_degrades_in_table_mode() {
            let mut dac = MockDac::new();
            let mut p: OutputPipeline<2> =
                OutputPipeline::new(settings(ClockMode::StandardRates, 5));
            let outcome = p.start(&mut dac, stereo(96_000)).unwrap();
            assert!(outcome.is_degraded());
            assert_eq!(outcome.actual_hz(), 46_875);
        }

        #[test]
        fn test_setup_requires_running() {
            let mut dac = MockDac::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            assert_eq!(p.setup(&mut dac, stereo(8_000)), Err(MixerError::NotRunning));
            assert_eq!(p.state(), PipelineState::Stopped);
            assert_eq!(dac.clock_writes, 0);
        }

        #[test]
        fn test_setup_reconfigures_without_restart() {
            let mut dac = MockDac::new();
            let mut p = running(&mut dac, stereo(44_100));
            p.setup(&mut dac, stereo(22_050)).unwrap();
            assert_eq!(p.state(), PipelineState::Running);
            assert_eq!(dac.enable_calls, 1);
            assert_eq!(dac.disable_calls, 0);
            assert_eq!(p.config().unwrap().actual_rate_hz, 22_050);
        }

        #[test]
        fn test_swap_toggled_only_on_change() {
            let mut dac = MockDac::new();
            let swapped = AudioConfig {
                swap_channels: true,
                ..AudioConfig::default()
            };
            let mut p = running(&mut dac, swapped);
            assert!(dac.swapped);
            p.setup(&mut dac, swapped).unwrap();
            assert!(dac.swapped, "same flag leaves the sink alone");
            p.setup(&mut dac, AudioConfig::default()).unwrap();
            assert!(!dac.swapped);
        }

        #[test]
        fn test_stop_twice_is_noop() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            p.stop(&mut dac, &mut pool);
            p.stop(&mut dac, &mut pool);
            assert_eq!(p.state(), PipelineState::Stopped);
            assert_eq!(dac.disable_calls, 1);
            assert!(!dac.enabled);
        }

        #[test]
        fn test_stop_releases_queued_buffers() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            queue(&mut p, &mut pool, &[1, 2], 1);
            queue(&mut p, &mut pool, &[3, 4], 1);
            p.stop(&mut dac, &mut pool);
            assert_eq!(pool.free_count(), 2);
            assert_eq!(p.queued(), 0);
        }

        #[test]
        fn test_enqueue_refused_when_not_running() {
            let mut pool = Pool::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            let h = pool.acquire().unwrap();
            let refused = p.enqueue(&mut pool, h, 1).expect_err("stopped");
            assert_eq!(refused.error, MixerError::NotRunning);
            assert_eq!(pool.state(refused.handle.index()), Some(BufferState::Filled));
        }

        #[test]
        fn test_pump_streams_stereo_and_releases() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            let idx = queue(&mut p, &mut pool, &[1, -1, 2, -2, 3, -3], 3);
            let n = p.pump(&mut dac, &mut pool, &VolumeControl::new(), 16).unwrap();
            assert_eq!(n, 3);
            assert_eq!(&dac.frames[..], &[(1, -1), (2, -2), (3, -3)]);
            assert_eq!(pool.state(idx), Some(BufferState::Free));
        }

        #[test]
        fn test_pump_respects_max_frames() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            let idx = queue(&mut p, &mut pool, &[1, 1, 2, 2, 3, 3], 3);
            assert_eq!(p.pump(&mut dac, &mut pool, &VolumeControl::new(), 2), Ok(2));
            assert_eq!(pool.state(idx), Some(BufferState::Draining));
            assert_eq!(p.in_flight(), Some(idx));
            assert_eq!(p.pump(&mut dac, &mut pool, &VolumeControl::new(), 2), Ok(1));
            assert_eq!(pool.state(idx), Some(BufferState::Free));
        }

        #[test]
        fn test_mono_is_duplicated() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mono = AudioConfig {
                channels: 1,
                ..AudioConfig::default()
            };
            let mut p = running(&mut dac, mono);
            queue(&mut p, &mut pool, &[7, 9], 2);
            p.pump(&mut dac, &mut pool, &VolumeControl::new(), 16).unwrap();
            assert_eq!(&dac.frames[..], &[(7, 7), (9, 9)]);
        }

        #[test]
        fn test_eight_bit_samples_are_widened() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let eight = AudioConfig {
                bit_depth: 8,
                ..AudioConfig::default()
            };
            let mut p = running(&mut dac, eight);
            queue(&mut p, &mut pool, &[0x7F, -128], 1);
            p.pump(&mut dac, &mut pool, &VolumeControl::new(), 16).unwrap();
            assert_eq!(&dac.frames[..], &[(0x7F00, i16::MIN)]);
        }

        #[test]
        fn test_length_is_clamped_to_buffer() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            queue(&mut p, &mut pool, &[0; 8], 100);
            assert_eq!(p.pump(&mut dac, &mut pool, &VolumeControl::new(), 100), Ok(4));
        }

        #[test]
        fn test_timeout_aborts_buffer_and_keeps_running() {
            let mut dac = MockDac::with_readiness(Readiness::StallAfterFrames(2));
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            let idx = queue(&mut p, &mut pool, &[1, 1, 2, 2, 3, 3, 4, 4], 4);
            let r = p.pump(&mut dac, &mut pool, &VolumeControl::new(), 16);
            assert_eq!(r, Err(MixerError::Timeout));
            assert_eq!(dac.frames_written, 2, "partial output");
            assert_eq!(pool.state(idx), Some(BufferState::Free));
            assert_eq!(p.state(), PipelineState::Running);
            assert_eq!(p.queued(), 0);
        }

        #[test]
        fn test_ready_after_polls_is_within_budget() {
            let mut dac = MockDac::with_readiness(Readiness::After(3));
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            queue(&mut p, &mut pool, &[1, 1, 2, 2], 2);
            assert_eq!(p.pump(&mut dac, &mut pool, &VolumeControl::new(), 16), Ok(2));
            assert_eq!(dac.polls, 8);
        }

        #[test]
        fn test_force_flush_mid_buffer_frees_it() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            let a = queue(&mut p, &mut pool, &[1, 1, 2, 2, 3, 3], 3);
            let b = queue(&mut p, &mut pool, &[4, 4], 1);
            p.pump(&mut dac, &mut pool, &VolumeControl::new(), 1).unwrap();
            p.flush(&mut dac, &mut pool, &VolumeControl::new(), true).unwrap();
            assert_eq!(pool.state(a), Some(BufferState::Free));
            assert_eq!(pool.state(b), Some(BufferState::Free));
            assert_eq!(p.state(), PipelineState::Running);
            assert_eq!(dac.frames_written, 1);
            assert!(dac.enabled, "sink stays enabled and idle");
        }

        #[test]
        fn test_graceful_flush_drains_everything() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            queue(&mut p, &mut pool, &[1, 1, 2, 2], 2);
            queue(&mut p, &mut pool, &[3, 3], 1);
            p.flush(&mut dac, &mut pool, &VolumeControl::new(), false).unwrap();
            assert_eq!(dac.frames_written, 3);
            assert_eq!(pool.free_count(), 2);
            assert_eq!(p.state(), PipelineState::Running);
        }

        #[test]
        fn test_graceful_flush_on_stalled_dac_returns() {
            let mut dac = MockDac::with_readiness(Readiness::Stalled);
            let mut pool = Pool::new();
            let mut p = running(&mut dac, stereo(44_100));
            queue(&mut p, &mut pool, &[1, 1], 1);
            queue(&mut p, &mut pool, &[2, 2], 1);
            let r = p.flush(&mut dac, &mut pool, &VolumeControl::new(), false);
            assert_eq!(r, Err(MixerError::Timeout));
            assert_eq!(pool.free_count(), 2);
            assert_eq!(p.state(), PipelineState::Running);
        }

        #[test]
        fn test_flush_requires_running() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            assert_eq!(
                p.flush(&mut dac, &mut pool, &VolumeControl::new(), true),
                Err(MixerError::NotRunning)
            );
        }

        #[test]
        fn test_pump_requires_running() {
            let mut dac = MockDac::new();
            let mut pool = Pool::new();
            let mut p: OutputPipeline<2> = OutputPipeline::default();
            assert_eq!(
                p.pump(&mut dac, &mut pool, &VolumeControl::new(), 1),
                Err(MixerError::NotRunning)
            );
        }
    }

    /// Volume/mute tests
    mod volume_tests {
        use platform::Volume;

        use crate::volume::VolumeControl;

        #[test]
        fn test_set_clamps_above_255() {
            let mut v = VolumeControl::new();
            assert_eq!(v.set_clamped(300), Volume::MAX);
        }

        #[test]
        fn test_decrease_at_zero_stays_zero() {
            let mut v = VolumeControl::with_step(Volume::MIN, 8);
            assert_eq!(v.decrease(), Volume::MIN);
        }

        #[test]
        fn test_increase_saturates() {
            let mut v = VolumeControl::with_step(Volume::new(250), 8);
            assert_eq!(v.increase(), Volume::MAX);
        }

        #[test]
        fn test_mute_round_trip_keeps_volume() {
            let mut v = VolumeControl::new();
            v.set(Volume::new(100));
            v.mute(true);
            assert!(v.is_muted());
            v.mute(false);
            assert_eq!(v.get(), Volume::new(100));
        }

        #[test]
        fn test_muted_output_is_silent() {
            let mut v = VolumeControl::new();
            v.mute(true);
            assert_eq!(v.scale(i16::MAX), 0);
            assert_eq!(v.get(), Volume::MAX);
        }

        #[test]
        fn test_unity_gain_is_identity() {
            let v = VolumeControl::new();
            assert_eq!(v.scale(i16::MIN), i16::MIN);
            assert_eq!(v.scale(1234), 1234);
        }

        #[test]
        fn test_half_volume() {
            let mut v = VolumeControl::new();
            v.set(Volume::new(128));
            assert_eq!(v.scale(1000), 501);
            assert_eq!(v.scale(-1000), -501);
        }
    }

    /// Shared mixer tests
    mod shared_tests {
        use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
        use platform::abdac::Abdac;
        use platform::mocks::MockDac;

        use crate::engine::PipelineState;
        use crate::error::MixerError;
        use crate::mixer::{AudioMixer, MixerConfig};
        use crate::shared::SharedMixer;

        type Shared = SharedMixer<NoopRawMutex, MockDac, 2, 8>;

        fn shared() -> Shared {
            SharedMixer::new(AudioMixer::new(MockDac::new(), MixerConfig::new()))
        }

        #[test]
        fn test_stop_through_shared_handle() {
            let s = shared();
            s.with(|m| m.start(44_100, 2, 16, false)).unwrap().unwrap();
            s.stop().unwrap();
            assert_eq!(s.status().unwrap().state, PipelineState::Stopped);
        }

        #[test]
        fn test_reentry_is_invalid_state() {
            let s = shared();
            let inner = s.with(|_| s.flush(true)).unwrap();
            assert_eq!(inner, Err(MixerError::InvalidState));
        }

        #[test]
        fn test_hardware_mixer_is_sync() {
            fn assert_sync<T: Sync>() {}
            assert_sync::<SharedMixer<CriticalSectionRawMutex, Abdac, 2, 64>>();
        }

        #[test]
        #[allow(clippy::declare_interior_mutable_const, clippy::borrow_interior_mutable_const)]
        fn test_shared_mixer_builds_in_const_context() {
            const SHARED: Shared =
                SharedMixer::new(AudioMixer::new(MockDac::new(), MixerConfig::new()));
            assert_eq!(SHARED.status().unwrap().state, PipelineState::Stopped);
        }

        #[test]
        fn test_into_inner_returns_mixer() {
            let s = shared();
            s.mute(true).unwrap();
            assert!(s.into_inner().is_muted());
        }
    }
}
