//! Upload configuration.

use std::time::Duration;

use crate::util::size::{kb, mb};

/// How bytes reach the buffer's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStrategy {
    /// Map the storage once at allocation and write through the same pointer
    /// on every upload, guarded by the buffer's fence
    PersistentMapped,
    /// Re-specify the storage, map it, write, and unmap on every upload
    MapPerCall,
}

/// Configuration for an upload session.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Upload strategy for newly allocated buffers (default: persistent)
    pub strategy: UploadStrategy,

    /// Let unallocated buffers adopt storage recorded at their slot
    pub recovery_enabled: bool,

    /// Longest time to wait for the GPU to release a buffer (default: 10 s)
    pub fence_timeout: Duration,

    /// Sleep between fence polls (default: 100 µs)
    pub fence_poll_interval: Duration,

    /// Copies at least this large are split across workers (default: 1 MB)
    pub parallel_copy_threshold: usize,

    /// Worker threads for large copies; 1 disables splitting
    pub copy_workers: usize,
}

fn available_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            strategy: UploadStrategy::PersistentMapped,
            recovery_enabled: true,
            fence_timeout: Duration::from_secs(10),
            fence_poll_interval: Duration::from_micros(100),
            parallel_copy_threshold: mb(1),
            copy_workers: available_workers().min(8),
        }
    }
}

impl UploadConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            strategy: UploadStrategy::PersistentMapped,
            recovery_enabled: true,
            fence_timeout: Duration::from_secs(1),
            fence_poll_interval: Duration::from_micros(50),
            parallel_copy_threshold: usize::MAX,
            copy_workers: 1,
        }
    }

    /// Create a config optimized for large, frequent uploads.
    pub fn high_throughput() -> Self {
        Self {
            strategy: UploadStrategy::PersistentMapped,
            recovery_enabled: true,
            fence_timeout: Duration::from_secs(10),
            fence_poll_interval: Duration::from_micros(20),
            parallel_copy_threshold: kb(256),
            copy_workers: available_workers(),
        }
    }

    /// Builder pattern: set upload strategy.
    pub fn with_strategy(mut self, strategy: UploadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder pattern: enable or disable recovery.
    pub fn with_recovery(mut self, enable: bool) -> Self {
        self.recovery_enabled = enable;
        self
    }

    /// Builder pattern: set fence timeout.
    pub fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    /// Builder pattern: set fence poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.fence_poll_interval = interval;
        self
    }

    /// Builder pattern: set parallel copy threshold and worker count.
    pub fn with_parallel_copy(mut self, threshold: usize, workers: usize) -> Self {
        self.parallel_copy_threshold = threshold;
        self.copy_workers = workers.max(1);
        self
    }
}
