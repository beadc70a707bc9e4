//! Synchronization primitives.
//!
//! Mutex wrapper over std or parking_lot, atomic counters, and the CPU-GPU
//! fence wrapper.

pub(crate) mod atomics;
pub mod fence;
pub mod mutex;

pub use fence::{Fence, FenceTimeout};
