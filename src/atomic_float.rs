//! Floating-point accumulation on integer atomics.
//!
//! There is no native atomic float add to rely on, so a slot stores the raw bit
//! pattern of its float and every add goes through a compare-and-swap retry loop.
//! The retry loop is unbounded and has no fairness guarantee.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// An atomic integer cell wide enough to hold the bits of `Self::Float`.
pub trait AtomicFloatBits {
    type Float: Copy + std::ops::Add<Output = Self::Float>;
    type Bits: Copy + Eq;

    fn load_bits(&self) -> Self::Bits;
    fn store_bits(&self, bits: Self::Bits);
    /// Replaces `current` with `new`; on failure returns the bits that were actually found.
    fn compare_exchange_bits(&self, current: Self::Bits, new: Self::Bits) -> Result<Self::Bits, Self::Bits>;
    fn to_float(bits: Self::Bits) -> Self::Float;
    fn from_float(value: Self::Float) -> Self::Bits;
}

impl AtomicFloatBits for AtomicU32 {
    type Float = f32;
    type Bits = u32;

    fn load_bits(&self) -> u32 {
        self.load(Ordering::Acquire)
    }

    fn store_bits(&self, bits: u32) {
        self.store(bits, Ordering::Release);
    }

    fn compare_exchange_bits(&self, current: u32, new: u32) -> Result<u32, u32> {
        self.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    fn to_float(bits: u32) -> f32 {
        f32::from_bits(bits)
    }

    fn from_float(value: f32) -> u32 {
        value.to_bits()
    }
}

impl AtomicFloatBits for AtomicU64 {
    type Float = f64;
    type Bits = u64;

    fn load_bits(&self) -> u64 {
        self.load(Ordering::Acquire)
    }

    fn store_bits(&self, bits: u64) {
        self.store(bits, Ordering::Release);
    }

    fn compare_exchange_bits(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    fn to_float(bits: u64) -> f64 {
        f64::from_bits(bits)
    }

    fn from_float(value: f64) -> u64 {
        value.to_bits()
    }
}

/// Adds `value` to the float stored in `slot` and returns the value it replaced.
pub fn atomic_add_float<A: AtomicFloatBits>(slot: &A, value: A::Float) -> A::Float {
    let mut current = slot.load_bits();
    loop {
        let old = A::to_float(current);
        let new = A::from_float(old + value);
        match slot.compare_exchange_bits(current, new) {
            Ok(_) => return old,
            Err(actual) => current = actual,
        }
    }
}

pub fn atomic_load_float<A: AtomicFloatBits>(slot: &A) -> A::Float {
    A::to_float(slot.load_bits())
}

pub fn atomic_store_float<A: AtomicFloatBits>(slot: &A, value: A::Float) {
    slot.store_bits(A::from_float(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn add_returns_previous_value() {
        let slot = AtomicU32::new(1.5f32.to_bits());
        let previous = atomic_add_float(&slot, 2.25f32);
        assert_eq!(previous, 1.5);
        assert_eq!(atomic_load_float(&slot), 3.75);
    }

    #[test]
    fn wide_slots_accumulate_f64() {
        let slot = AtomicU64::new(0);
        for _ in 0..10 {
            atomic_add_float(&slot, 0.1f64);
        }
        assert!((atomic_load_float(&slot) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn contended_adds_are_not_lost() {
        let slot = AtomicU32::new(0);
        let threads = 8;
        let adds_per_thread = 2_000;
        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..adds_per_thread {
                        atomic_add_float(&slot, 1.0f32);
                    }
                });
            }
        });
        // Integers up to 2^24 are exact in f32, so any lost update would show.
        assert_eq!(atomic_load_float(&slot), (threads * adds_per_thread) as f32);
    }
}
