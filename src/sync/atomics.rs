//! Atomic counters for upload sequencing and statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Monotonic sequence counter handing out recovery slots.
///
/// Each call to [`advance`](Self::advance) returns a distinct value, even when
/// called from several threads at once.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicUsize);

impl SequenceCounter {
    /// Create a counter whose first slot is `start`.
    pub const fn new(start: usize) -> Self {
        Self(AtomicUsize::new(start))
    }

    /// Take the next slot.
    pub fn advance(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel)
    }

    /// The slot the next call to `advance` will return.
    pub fn peek(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Restart the sequence at slot zero.
    pub fn rewind(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// An atomic counter for statistics.
#[derive(Debug)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create a new counter.
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Increment the counter.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a value to the counter.
    pub fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// High-water mark that only ever rises.
#[derive(Debug, Default)]
pub struct AtomicPeak(AtomicU64);

impl AtomicPeak {
    /// Raise the mark to `value` if it is higher.
    pub fn update(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latest observation of a value that can go up or down.
#[derive(Debug, Default)]
pub struct AtomicGauge(AtomicU64);

impl AtomicGauge {
    /// Replace the current value.
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
