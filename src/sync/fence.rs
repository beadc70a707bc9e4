//! CPU-GPU fence wrapper.
//!
//! A [`Fence`] tracks the last device fence armed against a buffer. Before the
//! CPU writes into persistently mapped memory it waits on the fence so the GPU
//! is done reading the previous contents.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::gpu::{DeviceError, FenceId, FenceStatus, GpuDevice};

/// A fence wait ran past its bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceTimeout {
    /// Time spent polling before giving up
    pub waited: Duration,
}

impl fmt::Display for FenceTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fence not signaled after {:?}", self.waited)
    }
}

impl std::error::Error for FenceTimeout {}

/// Fence slot owned by one allocation.
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    current: Option<FenceId>,
}

impl Fence {
    /// Create an empty fence slot. Waiting on it returns immediately.
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            current: None,
        }
    }

    /// Install a new device fence covering all work submitted so far, and
    /// discard the previous one.
    pub fn lock(&mut self) -> Result<FenceId, DeviceError> {
        let id = self.device.insert_fence()?;
        if let Some(previous) = self.current.replace(id) {
            self.device.delete_fence(previous);
        }
        Ok(id)
    }

    /// Block until the fence signals, polling every `poll_interval`.
    ///
    /// Returns the time spent waiting.
    pub fn wait(&self, timeout: Duration, poll_interval: Duration) -> Result<Duration, FenceTimeout> {
        let Some(id) = self.current else {
            return Ok(Duration::ZERO);
        };

        let start = Instant::now();
        loop {
            if self.device.fence_status(id) == FenceStatus::Signaled {
                return Ok(start.elapsed());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(FenceTimeout { waited });
            }
            thread::sleep(poll_interval.min(timeout - waited));
        }
    }

    /// Non-blocking check. An empty slot counts as signaled.
    pub fn is_signaled(&self) -> bool {
        self.current
            .map_or(true, |id| self.device.fence_status(id) == FenceStatus::Signaled)
    }

    /// The installed device fence, if any.
    pub fn id(&self) -> Option<FenceId> {
        self.current
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence").field("current", &self.current).finish()
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if let Some(id) = self.current.take() {
            self.device.delete_fence(id);
        }
    }
}
