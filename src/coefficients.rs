use crate::atomic_float::{atomic_add_float, atomic_store_float, AtomicFloatBits};
use crate::sh::{ShCoefficients, SH_BUFFER_WORDS, SH_WORDS_PER_BAND};
use anyhow::{bail, Result};
use glam::Vec3;
use std::sync::atomic::AtomicU32;

/// Where a coefficient buffer is in its `allocate -> reset -> accumulate -> finalize` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Allocated but never reset; contents must not be trusted.
    Allocated,
    /// Reset and waiting for the first dispatch.
    Zeroed,
    /// At least one dispatch has merged into the buffer since the last reset.
    Accumulating { dispatches: u32 },
}

/// Tracks the lifecycle of a coefficient buffer so misuse is reported instead of
/// silently folding stale data into a fresh accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLifecycle {
    state: BufferState,
}

impl BufferLifecycle {
    pub fn new() -> Self {
        Self { state: BufferState::Allocated }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn mark_reset(&mut self) {
        self.state = BufferState::Zeroed;
    }

    /// Marks the start of one face dispatch.
    pub fn begin_dispatch(&mut self) -> Result<()> {
        self.state = match self.state {
            BufferState::Allocated => {
                bail!("Coefficient buffer was never reset; call reset() before the first dispatch.")
            }
            BufferState::Zeroed => BufferState::Accumulating { dispatches: 1 },
            BufferState::Accumulating { dispatches } => {
                BufferState::Accumulating { dispatches: dispatches.saturating_add(1) }
            }
        };
        Ok(())
    }

    pub fn ensure_readable(&self) -> Result<()> {
        if self.state == BufferState::Allocated {
            bail!("Coefficient buffer was never reset; its contents are undefined.");
        }
        Ok(())
    }

    pub fn dispatch_count(&self) -> u32 {
        match self.state {
            BufferState::Accumulating { dispatches } => dispatches,
            _ => 0,
        }
    }
}

impl Default for BufferLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared accumulator of nine RGB bands plus one padding word per band.
///
/// Each word holds an `f32` bit pattern. Concurrent writers only ever go through
/// [`ShCoefficientBuffer::accumulate_band`], which adds per channel with a CAS retry loop.
#[derive(Debug)]
pub struct ShCoefficientBuffer {
    words: [AtomicU32; SH_BUFFER_WORDS],
    lifecycle: BufferLifecycle,
}

impl ShCoefficientBuffer {
    /// Allocates a buffer. It must be [`reset`](Self::reset) before the first dispatch.
    pub fn allocate() -> Self {
        Self { words: std::array::from_fn(|_| AtomicU32::new(0)), lifecycle: BufferLifecycle::new() }
    }

    pub fn state(&self) -> BufferState {
        self.lifecycle.state()
    }

    pub fn reset(&mut self) {
        for word in &self.words {
            atomic_store_float(word, 0.0f32);
        }
        self.lifecycle.mark_reset();
    }

    pub fn begin_dispatch(&mut self) -> Result<()> {
        self.lifecycle.begin_dispatch()
    }

    pub fn dispatch_count(&self) -> u32 {
        self.lifecycle.dispatch_count()
    }

    /// Adds `rgb` to `band`, one CAS-retry add per channel.
    pub fn accumulate_band(&self, band: usize, rgb: Vec3) {
        let base = band * SH_WORDS_PER_BAND;
        atomic_add_float(&self.words[base], rgb.x);
        atomic_add_float(&self.words[base + 1], rgb.y);
        atomic_add_float(&self.words[base + 2], rgb.z);
    }

    /// Clears the padding word of `band`. Idempotent, so every group may do it.
    pub fn clear_padding(&self, band: usize) {
        atomic_store_float(&self.words[band * SH_WORDS_PER_BAND + 3], 0.0f32);
    }

    pub fn to_words(&self) -> [u32; SH_BUFFER_WORDS] {
        std::array::from_fn(|index| self.words[index].load_bits())
    }

    /// Current contents, whatever the lifecycle state.
    pub fn snapshot(&self) -> ShCoefficients {
        ShCoefficients::from_padded_words(&self.to_words())
    }

    /// Reads the accumulated coefficients. No normalization is applied.
    pub fn finalize(&self) -> Result<ShCoefficients> {
        self.lifecycle.ensure_readable()?;
        Ok(self.snapshot())
    }
}

impl Default for ShCoefficientBuffer {
    fn default() -> Self {
        Self::allocate()
    }
}
