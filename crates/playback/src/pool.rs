//! Const-generic, statically sized pool of sample buffers.
//!
//! `BufferPool<N, SAMPLES>` owns `N` buffers of `SAMPLES` `i16` samples each.
//! Buffers are never allocated or freed at runtime, only moved between
//! states:
//!
//! ```text
//!   Free ──acquire──► Filled ──begin_drain──► Draining ──release──► Free
//!                       │
//!                       └──discard──► Free
//! ```
//!
//! Ownership of a buffer travels with its [`BufferHandle`]. The handle is
//! neither `Clone` nor `Copy`, so a buffer cannot be held by the producer and
//! the pipeline at the same time.
//!
//! # Constraints
//!
//! - The runtime geometry set by [`BufferPool::configure`] must fit inside
//!   `N × SAMPLES`.
//! - Not interrupt-safe. Share it through
//!   [`SharedMixer`](crate::shared::SharedMixer) when more than one context
//!   touches it.

use crate::error::MixerError;

/// Lifecycle state of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferState {
    /// Owned by the pool, available to `acquire`.
    Free,
    /// Owned by the producer, being filled.
    Filled,
    /// Owned by the output pipeline, being streamed to the DAC.
    Draining,
}

impl BufferState {
    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Filled => "Filled",
            Self::Draining => "Draining",
        }
    }
}

/// Move-only token naming one pool slot.
#[derive(Debug, PartialEq, Eq)]
pub struct BufferHandle {
    index: usize,
}

impl BufferHandle {
    /// Slot index inside the pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A handle given back to its owner together with the reason it was refused.
#[derive(Debug, PartialEq, Eq)]
pub struct Refused {
    /// The buffer, still owned by the caller.
    pub handle: BufferHandle,
    /// Why the operation did not take it.
    pub error: MixerError,
}

/// Fixed-capacity pool of `N` buffers × `SAMPLES` samples.
pub struct BufferPool<const N: usize, const SAMPLES: usize> {
    storage: [[i16; SAMPLES]; N],
    states: [BufferState; N],
    /// Valid samples per slot, recorded when draining starts.
    lengths: [usize; N],
    buffer_count: usize,
    buffer_size: usize,
}

impl<const N: usize, const SAMPLES: usize> BufferPool<N, SAMPLES> {
    /// Create a pool using its full static geometry.
    ///
    /// `const` so the pool can live in a `static`.
    pub const fn new() -> Self {
        Self {
            storage: [[0; SAMPLES]; N],
            states: [BufferState::Free; N],
            lengths: [0; N],
            buffer_count: N,
            buffer_size: SAMPLES,
        }
    }

    /// Set the runtime geometry: `buffer_count` buffers of `buffer_size` samples.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if either value is zero or exceeds the static capacity.
    /// - `InvalidState` if any buffer is still owned by the producer or pipeline.
    pub fn configure(&mut self, buffer_count: usize, buffer_size: usize) -> Result<(), MixerError> {
        if buffer_count == 0 || buffer_count > N || buffer_size == 0 || buffer_size > SAMPLES {
            warn!(
                "pool geometry {}x{} exceeds {}x{}",
                buffer_count,
                buffer_size,
                N,
                SAMPLES
            );
            return Err(MixerError::InvalidConfig);
        }
        if self.free_count() != self.buffer_count {
            return Err(MixerError::InvalidState);
        }
        self.buffer_count = buffer_count;
        self.buffer_size = buffer_size;
        self.lengths = [0; N];
        debug!("pool configured: {} buffers of {} samples", buffer_count, buffer_size);
        Ok(())
    }

    /// Take a Free buffer. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `PoolExhausted` when no buffer is Free.
    pub fn acquire(&mut self) -> Result<BufferHandle, MixerError> {
        let index = self
            .states
            .iter()
            .take(self.buffer_count)
            .position(|s| *s == BufferState::Free)
            .ok_or(MixerError::PoolExhausted)?;
        self.set_state(index, BufferState::Filled);
        Ok(BufferHandle { index })
    }

    /// Take a Free buffer able to hold `size` samples.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `size` exceeds the configured buffer size, otherwise
    /// as [`acquire`](Self::acquire).
    pub fn acquire_sized(&mut self, size: usize) -> Result<BufferHandle, MixerError> {
        if size > self.buffer_size {
            return Err(MixerError::InvalidConfig);
        }
        self.acquire()
    }

    /// Samples of a buffer, read-only.
    pub fn samples(&self, handle: &BufferHandle) -> &[i16] {
        self.storage
            .get(handle.index)
            .and_then(|b| b.get(..self.buffer_size))
            .unwrap_or_default()
    }

    /// Samples of a buffer, for the producer to fill.
    pub fn samples_mut(&mut self, handle: &BufferHandle) -> &mut [i16] {
        let size = self.buffer_size;
        self.storage
            .get_mut(handle.index)
            .and_then(|b| b.get_mut(..size))
            .unwrap_or_default()
    }

    /// Hand a Filled buffer to the pipeline: Filled → Draining.
    ///
    /// `len` is the number of valid samples, clamped to the buffer size.
    /// Returns the recorded length.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the buffer is not Filled.
    pub fn begin_drain(&mut self, handle: &BufferHandle, len: usize) -> Result<usize, MixerError> {
        self.expect_state(handle, BufferState::Filled)?;
        let len = len.min(self.buffer_size);
        if let Some(slot) = self.lengths.get_mut(handle.index) {
            *slot = len;
        }
        self.set_state(handle.index, BufferState::Draining);
        Ok(len)
    }

    /// Undo [`begin_drain`](Self::begin_drain): Draining → Filled.
    pub(crate) fn cancel_drain(&mut self, handle: &BufferHandle) {
        if self.state(handle.index) == Some(BufferState::Draining) {
            self.set_state(handle.index, BufferState::Filled);
        }
    }

    /// Valid samples recorded for a Draining buffer.
    pub fn filled_len(&self, handle: &BufferHandle) -> usize {
        self.lengths.get(handle.index).copied().unwrap_or(0)
    }

    /// Return a drained buffer to the pool: Draining → Free.
    ///
    /// # Errors
    ///
    /// Any other state is logged and refused with `InvalidState`; the handle
    /// comes back to the caller and the slot is left untouched.
    pub fn release(&mut self, handle: BufferHandle) -> Result<(), Refused> {
        if let Err(error) = self.expect_state(&handle, BufferState::Draining) {
            return Err(Refused { handle, error });
        }
        if let Some(slot) = self.lengths.get_mut(handle.index) {
            *slot = 0;
        }
        self.set_state(handle.index, BufferState::Free);
        Ok(())
    }

    /// Give back a buffer the producer decided not to submit: Filled → Free.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the buffer is not Filled; the handle comes back.
    pub fn discard(&mut self, handle: BufferHandle) -> Result<(), Refused> {
        if let Err(error) = self.expect_state(&handle, BufferState::Filled) {
            return Err(Refused { handle, error });
        }
        self.set_state(handle.index, BufferState::Free);
        Ok(())
    }

    /// State of slot `index`, or `None` outside the configured geometry.
    pub fn state(&self, index: usize) -> Option<BufferState> {
        if index >= self.buffer_count {
            return None;
        }
        self.states.get(index).copied()
    }

    /// Number of Free buffers.
    pub fn free_count(&self) -> usize {
        self.states
            .iter()
            .take(self.buffer_count)
            .filter(|s| **s == BufferState::Free)
            .count()
    }

    /// Configured number of buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Configured samples per buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Static capacity as `(buffers, samples per buffer)`.
    pub const fn capacity(&self) -> (usize, usize) {
        (N, SAMPLES)
    }

    fn expect_state(&self, handle: &BufferHandle, want: BufferState) -> Result<(), MixerError> {
        match self.state(handle.index) {
            Some(s) if s == want => Ok(()),
            Some(s) => {
                warn!(
                    "buffer {} is {}, expected {}",
                    handle.index,
                    s.as_str(),
                    want.as_str()
                );
                Err(MixerError::InvalidState)
            }
            None => {
                warn!("buffer {} outside pool of {}", handle.index, self.buffer_count);
                Err(MixerError::InvalidState)
            }
        }
    }

    fn set_state(&mut self, index: usize, state: BufferState) {
        if let Some(slot) = self.states.get_mut(index) {
            *slot = state;
        }
    }
}

impl<const N: usize, const SAMPLES: usize> Default for BufferPool<N, SAMPLES> {
    fn default() -> Self {
        Self::new()
    }
}
