//! Upload statistics.

use std::time::Duration;

use crate::sync::atomics::{AtomicCounter, AtomicGauge, AtomicPeak};

/// Upload statistics for a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadStats {
    /// Successful uploads
    pub uploads: u64,
    /// Failed uploads
    pub failed_uploads: u64,
    /// Bytes written into buffer storage
    pub bytes_uploaded: u64,
    /// Fresh storage allocations
    pub allocations: u64,
    /// Uploads that adopted storage from the recovery cache
    pub restores: u64,
    /// Fence waits that ran out of time
    pub fence_timeouts: u64,
    /// Total time spent waiting on fences
    pub fence_wait: Duration,
    /// Largest single upload in bytes
    pub peak_upload_bytes: u64,
    /// Duration of the most recent successful upload
    pub last_transfer: Duration,
}

/// Throughput in GB/s of `bytes` moved in `elapsed`.
pub fn transfer_rate_gbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| bytes as f64 / (1024.0 * 1024.0 * 1024.0) / secs)
}

/// Lock-free recorder behind [`UploadStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    uploads: AtomicCounter,
    failed_uploads: AtomicCounter,
    bytes_uploaded: AtomicCounter,
    allocations: AtomicCounter,
    restores: AtomicCounter,
    fence_timeouts: AtomicCounter,
    fence_wait_ns: AtomicCounter,
    peak_upload_bytes: AtomicPeak,
    last_transfer_ns: AtomicGauge,
}

impl StatsRecorder {
    pub(crate) fn record_success(
        &self,
        bytes: usize,
        allocated: bool,
        restored: bool,
        fence_wait: Duration,
        elapsed: Duration,
    ) {
        self.uploads.increment();
        self.bytes_uploaded.add(bytes as u64);
        self.peak_upload_bytes.update(bytes as u64);
        self.fence_wait_ns.add(fence_wait.as_nanos() as u64);
        self.last_transfer_ns.set(elapsed.as_nanos() as u64);
        if allocated {
            self.allocations.increment();
        }
        if restored {
            self.restores.increment();
        }
    }

    pub(crate) fn record_failure(&self, timed_out: bool) {
        self.failed_uploads.increment();
        if timed_out {
            self.fence_timeouts.increment();
        }
    }

    pub(crate) fn snapshot(&self) -> UploadStats {
        UploadStats {
            uploads: self.uploads.get(),
            failed_uploads: self.failed_uploads.get(),
            bytes_uploaded: self.bytes_uploaded.get(),
            allocations: self.allocations.get(),
            restores: self.restores.get(),
            fence_timeouts: self.fence_timeouts.get(),
            fence_wait: Duration::from_nanos(self.fence_wait_ns.get()),
            peak_upload_bytes: self.peak_upload_bytes.get(),
            last_transfer: Duration::from_nanos(self.last_transfer_ns.get()),
        }
    }
}
