//! Upload session - the state every buffer upload shares.
//!
//! A session owns the sequence counter that hands out upload slots, the
//! recovery cache indexed by those slots, the upload configuration and the
//! statistics. Resources borrow the session for each upload; the session
//! itself is `Send + Sync` and can be shared across threads in an `Arc`.

use std::fmt;
use std::sync::Arc;

use super::config::{UploadConfig, UploadStrategy};
use super::error::UploadError;
use super::recovery::{RecoveryCache, Snapshot};
use super::stats::{StatsRecorder, UploadStats};
use crate::diagnostics::{self, Diagnostic, DiagnosticSink};
use crate::gpu::GpuDevice;
use crate::sync::atomics::SequenceCounter;
use crate::sync::mutex::{Mutex, MutexGuard};

const DOWNGRADE_CONTEXT: &str = "session created with PersistentMapped strategy";

/// Shared upload state for one device.
pub struct UploadSession {
    device: Arc<dyn GpuDevice>,
    config: UploadConfig,
    counter: SequenceCounter,
    cache: Mutex<RecoveryCache>,
    stats: StatsRecorder,
    sink: Mutex<Option<Arc<dyn DiagnosticSink>>>,
    /// The configured strategy was downgraded at construction
    downgraded: bool,
}

impl UploadSession {
    /// Create a session for `device`.
    ///
    /// A persistent-mapped strategy on a device that cannot map persistently
    /// is downgraded to map-per-call.
    pub fn new(device: Arc<dyn GpuDevice>, mut config: UploadConfig) -> Self {
        let downgraded = config.strategy == UploadStrategy::PersistentMapped
            && !device.capabilities().persistent_mapping;
        if downgraded {
            config.strategy = UploadStrategy::MapPerCall;
        }

        let session = Self {
            device,
            config,
            counter: SequenceCounter::new(0),
            cache: Mutex::new(RecoveryCache::new()),
            stats: StatsRecorder::default(),
            sink: Mutex::new(None),
            downgraded,
        };
        if downgraded {
            session.report(&diagnostics::GB204, DOWNGRADE_CONTEXT);
        }
        session
    }

    /// Create a session with the default configuration.
    pub fn with_defaults(device: Arc<dyn GpuDevice>) -> Self {
        Self::new(device, UploadConfig::default())
    }

    /// Take the next upload slot.
    pub fn next_slot(&self) -> usize {
        self.counter.advance()
    }

    /// Restart slot numbering at zero, so a rebuilt set of buffers uploading
    /// in the same order finds its earlier storage.
    pub fn rewind(&self) {
        self.counter.rewind();
    }

    /// The slot the next upload will take.
    pub fn sequence(&self) -> usize {
        self.counter.peek()
    }

    /// Lock the recovery cache for inspection.
    pub fn recovery(&self) -> MutexGuard<'_, RecoveryCache> {
        self.cache.lock()
    }

    /// Drop the snapshot at `slot`, returning whether one was there.
    ///
    /// The storage is freed once no buffer is using it.
    pub fn invalidate(&self, slot: usize) -> bool {
        // Drop the snapshot after releasing the lock
        let taken = self.cache.lock().invalidate(slot);
        taken.is_some()
    }

    pub(crate) fn snapshot_at(&self, slot: usize) -> Option<Snapshot> {
        self.cache.lock().get(slot).cloned()
    }

    pub(crate) fn record(&self, slot: usize, snapshot: Snapshot) -> bool {
        self.cache.lock().record(slot, snapshot)
    }

    /// Statistics gathered so far.
    pub fn stats(&self) -> UploadStats {
        self.stats.snapshot()
    }

    pub(crate) fn stats_recorder(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Effective configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// The device uploads go to.
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Also hand every diagnostic to `sink`.
    ///
    /// Diagnostics raised while the session was built are replayed to it.
    pub fn set_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) {
        if self.downgraded {
            sink.emit(&diagnostics::GB204, DOWNGRADE_CONTEXT);
        }
        *self.sink.lock() = Some(sink);
    }

    pub(crate) fn report(&self, diag: &Diagnostic, context: &str) {
        diagnostics::emit(diag, context);
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.emit(diag, context);
        }
    }

    pub(crate) fn report_failure(&self, err: &UploadError) {
        let timed_out = matches!(err, UploadError::SynchronizationTimeout { .. });
        self.stats.record_failure(timed_out);

        let context = err.to_string();
        let diag = match err {
            UploadError::IncompatibleCategory { .. } => &diagnostics::GB101,
            UploadError::AllocationFailure(super::AllocationFailure::DeviceErrors(_)) => {
                &diagnostics::GB202
            }
            UploadError::AllocationFailure(super::AllocationFailure::ExceedsCapacity { .. }) => {
                &diagnostics::GB203
            }
            UploadError::AllocationFailure(_) => &diagnostics::GB201,
            UploadError::SynchronizationTimeout { .. } => &diagnostics::GB301,
        };
        self.report(diag, &context);
    }
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("config", &self.config)
            .field("sequence", &self.sequence())
            .field("recovery_slots", &self.cache.lock().len())
            .finish()
    }
}
