//! The upload path: slot, restore, allocate, wait, copy, re-arm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::{UploadConfig, UploadStrategy};
use super::copy::copy_bytes;
use super::error::{AllocationFailure, UploadError};
use super::recovery::Snapshot;
use super::session::UploadSession;
use crate::diagnostics;
use crate::gpu::{BindingTarget, DeviceError, MapAccess, StorageFlags};
use crate::resource::allocation::MapGuard;
use crate::resource::buffer::ResourceState;
use crate::resource::{BufferCategory, BufferResource, SharedAllocation};

/// What a successful upload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Sequence slot the upload consumed
    pub slot: usize,
    /// Storage was adopted from the recovery cache
    pub restored: bool,
    /// Storage was freshly allocated by this upload
    pub allocated: bool,
    /// Bytes written
    pub bytes: usize,
    /// Wall time of the whole upload
    pub elapsed: Duration,
    /// Part of `elapsed` spent waiting on the buffer's fence
    pub fence_wait: Duration,
}

pub(crate) fn upload(
    resource: &mut BufferResource,
    session: &UploadSession,
    data: &[u8],
    category: BufferCategory,
) -> Result<UploadReceipt, UploadError> {
    let previous_target = resource.target;
    let result = run(resource, session, data, category);
    // A failed call that left no storage attached also takes back the
    // target it fixed or adopted
    if result.is_err() && !resource.is_allocated() {
        resource.target = previous_target;
    }
    result
}

/// The upload itself; [`upload`] rolls back the target when it fails.
fn run(
    resource: &mut BufferResource,
    session: &UploadSession,
    data: &[u8],
    category: BufferCategory,
) -> Result<UploadReceipt, UploadError> {
    let start = Instant::now();
    let config = session.config();
    let slot = session.next_slot();

    if data.is_empty() {
        return Err(AllocationFailure::ZeroSize.into());
    }

    let mut restored = false;
    if config.recovery_enabled && matches!(resource.state, ResourceState::Unallocated) {
        if let Some(snapshot) = session.snapshot_at(slot) {
            restored = adopt(resource, session, &snapshot, data.len(), category)?;
        }
    }

    if let Err(err) = resource.try_allocate(category) {
        if restored {
            resource.state = ResourceState::Unallocated;
        }
        return Err(err);
    }

    let mut allocated = false;
    if let ResourceState::Created(handle) = resource.state {
        // The allocation owns the handle from here on, and destroys it on failure
        resource.state = ResourceState::Unallocated;

        let device = Arc::clone(resource.device_arc());
        let stale = device.drain_errors();
        if !stale.is_empty() {
            session.report(&diagnostics::GB205, &format!("{} before allocating {}", join_codes(&stale), handle));
        }
        if category == BufferCategory::Texture && resource.target != BindingTarget::TextureBuffer {
            session.report(&diagnostics::GB102, &format!("{} bound at {}", handle, resource.target.name()));
        }

        let persistent = config.strategy == UploadStrategy::PersistentMapped;
        let allocation = SharedAllocation::create(&device, handle, resource.target, data.len(), persistent)?;
        resource.state = ResourceState::Ready(Arc::new(allocation));
        allocated = true;
    }

    let Some(allocation) = resource.allocation().cloned() else {
        return Err(AllocationFailure::Device(DeviceError::InvalidOperation("buffer has no storage")).into());
    };
    if data.len() > allocation.capacity() {
        return Err(AllocationFailure::ExceedsCapacity {
            requested: data.len(),
            capacity: allocation.capacity(),
        }
        .into());
    }

    let fence_wait = match transfer(&allocation, data, config) {
        Ok(waited) => waited,
        Err(err) => {
            if allocated || restored {
                resource.state = ResourceState::Unallocated;
            }
            return Err(err);
        }
    };

    if allocated && config.recovery_enabled {
        session.record(slot, Snapshot::capture(slot, &allocation));
    }

    resource.dirty = false;
    let elapsed = start.elapsed();
    session
        .stats_recorder()
        .record_success(data.len(), allocated, restored, fence_wait, elapsed);
    diagnostics::trace_transfer(data.len(), elapsed);

    Ok(UploadReceipt {
        slot,
        restored,
        allocated,
        bytes: data.len(),
        elapsed,
        fence_wait,
    })
}

/// Take over the snapshot's storage when it fits. Returns whether it did.
fn adopt(
    resource: &mut BufferResource,
    session: &UploadSession,
    snapshot: &Snapshot,
    len: usize,
    category: BufferCategory,
) -> Result<bool, UploadError> {
    let requested = category.resolve(resource.device_arc().capabilities());
    if snapshot.target() != requested {
        return Err(UploadError::IncompatibleCategory {
            requested: category,
            actual: snapshot.category(),
        });
    }

    if snapshot.capacity() < len {
        session.report(
            &diagnostics::GB401,
            &format!(
                "slot {} holds {} bytes, upload needs {}",
                snapshot.slot(),
                snapshot.capacity(),
                len
            ),
        );
        return Ok(false);
    }

    resource.state = ResourceState::Ready(Arc::clone(snapshot.allocation()));
    resource.target = snapshot.target();
    Ok(true)
}

/// Write `data` into the allocation and re-arm its fence.
///
/// Returns the time spent waiting for the GPU.
fn transfer(
    allocation: &SharedAllocation,
    data: &[u8],
    config: &UploadConfig,
) -> Result<Duration, UploadError> {
    let mut guard = allocation.lock();
    let state = &mut *guard;

    // No write path touches the storage before the GPU releases it
    let waited = state
        .fence
        .wait(config.fence_timeout, config.fence_poll_interval)?;
    match state.mapping.as_mut() {
        Some(region) => {
            copy_bytes(
                data,
                region.as_mut_slice(),
                config.parallel_copy_threshold,
                config.copy_workers,
            );
        }
        None => write_orphaned(allocation, data, config)?,
    }

    state.fence.lock().map_err(AllocationFailure::Device)?;
    Ok(waited)
}

/// Re-specify the storage, then map, copy and unmap.
fn write_orphaned(
    allocation: &SharedAllocation,
    data: &[u8],
    config: &UploadConfig,
) -> Result<(), AllocationFailure> {
    let device = allocation.device();
    let (handle, target) = (allocation.handle(), allocation.target());

    device.bind_buffer(target, Some(handle));
    if let Err(err) = device.allocate_storage(handle, target, allocation.capacity(), StorageFlags::DYNAMIC_WRITE) {
        device.drain_errors();
        return Err(AllocationFailure::Device(err));
    }
    let drained = device.drain_errors();
    if !drained.is_empty() {
        return Err(AllocationFailure::DeviceErrors(drained));
    }

    let access = MapAccess::WRITE | MapAccess::INVALIDATE_RANGE;
    let Some(mut mapping) = MapGuard::map(device, handle, target, data.len(), access) else {
        device.drain_errors();
        return Err(AllocationFailure::MapFailed);
    };
    copy_bytes(
        data,
        mapping.bytes_mut(),
        config.parallel_copy_threshold,
        config.copy_workers,
    );
    Ok(())
}

fn join_codes(codes: &[crate::gpu::DeviceErrorCode]) -> String {
    codes
        .iter()
        .map(|code| code.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::gpu::{DeviceErrorCode, DummyDevice, FenceBehavior, GpuDevice};
    use crate::upload::UploadErrorKind;

    fn short_timeout(config: UploadConfig) -> UploadConfig {
        config
            .with_fence_timeout(Duration::from_millis(10))
            .with_poll_interval(Duration::from_millis(1))
    }

    fn setup(config: UploadConfig) -> (Arc<DummyDevice>, UploadSession) {
        let device = Arc::new(DummyDevice::new());
        let session = UploadSession::new(device.clone(), config);
        (device, session)
    }

    #[test]
    fn first_upload_allocates_and_records() {
        let (device, session) = setup(UploadConfig::minimal());
        let mut buffer = BufferResource::new(device.clone());

        let receipt = buffer.upload(&session, &[1, 2, 3, 4], BufferCategory::Vertex).unwrap();
        assert_eq!(receipt.slot, 0);
        assert!(receipt.allocated);
        assert!(!receipt.restored);
        assert_eq!(buffer.capacity(), 4);
        assert!(!buffer.is_dirty());
        assert_eq!(session.recovery().occupied(), 1);
        assert_eq!(device.live_fences(), 1);
    }

    #[test]
    fn second_upload_reuses_storage() {
        let (device, session) = setup(UploadConfig::minimal());
        let mut buffer = BufferResource::new(device.clone());

        buffer.upload(&session, &[9; 16], BufferCategory::Index).unwrap();
        let handle = buffer.handle();
        let receipt = buffer.upload(&session, &[7; 8], BufferCategory::Index).unwrap();

        assert!(!receipt.allocated);
        assert_eq!(buffer.handle(), handle);
        assert_eq!(device.map_count(handle.unwrap()), 1);
        assert_eq!(buffer.read_back(16).unwrap()[..9], [7, 7, 7, 7, 7, 7, 7, 7, 9]);
    }

    #[test]
    fn empty_upload_takes_a_slot_and_fails() {
        let (device, session) = setup(UploadConfig::minimal());
        let mut buffer = BufferResource::new(device);

        let err = buffer.upload(&session, &[], BufferCategory::Vertex).unwrap_err();
        assert_eq!(err, UploadError::AllocationFailure(AllocationFailure::ZeroSize));
        assert_eq!(session.sequence(), 1);
        assert!(!buffer.is_allocated());
    }

    #[test]
    fn small_snapshot_is_skipped() {
        let (device, session) = setup(UploadConfig::minimal());
        let sink = Arc::new(CollectingSink::new());
        session.set_diagnostic_sink(sink.clone());

        let mut first = BufferResource::new(device.clone());
        first.upload(&session, &[1; 4], BufferCategory::Vertex).unwrap();
        first.release();

        session.rewind();
        let mut second = BufferResource::new(device.clone());
        let receipt = second.upload(&session, &[2; 32], BufferCategory::Vertex).unwrap();
        assert!(receipt.allocated);
        assert!(!receipt.restored);
        assert_eq!(second.capacity(), 32);
        assert_eq!(sink.codes(), vec!["GB401"]);

        // The slot keeps its first snapshot
        assert_eq!(session.recovery().get(0).unwrap().capacity(), 4);
    }

    #[test]
    fn stale_errors_are_discarded_with_a_warning() {
        let (device, session) = setup(UploadConfig::minimal());
        let sink = Arc::new(CollectingSink::new());
        session.set_diagnostic_sink(sink.clone());
        device.push_error(DeviceErrorCode::InvalidEnum);

        let mut buffer = BufferResource::new(device.clone());
        buffer.upload(&session, &[1; 4], BufferCategory::Vertex).unwrap();
        assert_eq!(sink.codes(), vec!["GB205"]);
        assert!(device.drain_errors().is_empty());
    }

    #[test]
    fn map_per_call_orphans_every_upload() {
        let (device, session) =
            setup(UploadConfig::minimal().with_strategy(UploadStrategy::MapPerCall));
        let mut buffer = BufferResource::new(device.clone());

        buffer.upload(&session, &[5; 8], BufferCategory::Vertex).unwrap();
        buffer.upload(&session, &[6; 4], BufferCategory::Vertex).unwrap();
        let handle = buffer.handle().unwrap();

        assert!(!device.is_mapped(handle));
        assert_eq!(device.map_count(handle), 2);
        assert_eq!(device.read(handle, 0, 8), Some(vec![6, 6, 6, 6, 0, 0, 0, 0]));
    }

    #[test]
    fn failed_map_releases_fresh_storage() {
        let (device, session) =
            setup(UploadConfig::minimal().with_strategy(UploadStrategy::MapPerCall));
        let mut buffer = BufferResource::new(device.clone());
        device.fail_next_map();

        let err = buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap_err();
        assert_eq!(err, UploadError::AllocationFailure(AllocationFailure::MapFailed));
        assert!(!buffer.is_allocated());
        // Recording happens only on success
        assert_eq!(session.recovery().occupied(), 0);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn pending_fence_is_waited_out() {
        let (device, session) = setup(UploadConfig::minimal());
        let mut buffer = BufferResource::new(device.clone());
        buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap();

        device.set_fence_behavior(FenceBehavior::AfterPolls(3));
        buffer.upload(&session, &[2; 8], BufferCategory::Vertex).unwrap();
        let receipt = buffer.upload(&session, &[3; 8], BufferCategory::Vertex).unwrap();
        assert!(receipt.fence_wait > Duration::ZERO);
        assert_eq!(buffer.read_back(8), Some(vec![3; 8]));
    }

    #[test]
    fn texture_fallback_warns() {
        let device = Arc::new(DummyDevice::with_capabilities(crate::gpu::DeviceCapabilities {
            texture_buffers: false,
            persistent_mapping: true,
        }));
        let session = UploadSession::new(device.clone(), UploadConfig::minimal());
        let sink = Arc::new(CollectingSink::new());
        session.set_diagnostic_sink(sink.clone());

        let mut buffer = BufferResource::new(device.clone() as Arc<dyn GpuDevice>);
        buffer.upload(&session, &[1; 4], BufferCategory::Texture).unwrap();
        assert_eq!(buffer.target(), BindingTarget::ArrayBuffer);
        assert_eq!(sink.codes(), vec!["GB102"]);
    }

    #[test]
    fn map_per_call_waits_for_pending_fence() {
        let config = short_timeout(UploadConfig::minimal().with_strategy(UploadStrategy::MapPerCall));
        let (device, session) = setup(config);
        let mut buffer = BufferResource::new(device.clone());

        buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap();
        device.set_fence_behavior(FenceBehavior::Never);
        buffer.upload(&session, &[2; 8], BufferCategory::Vertex).unwrap();
        let handle = buffer.handle().unwrap();

        let err = buffer.upload(&session, &[3; 8], BufferCategory::Vertex).unwrap_err();
        assert_eq!(err.kind(), UploadErrorKind::SynchronizationTimeout);

        // Storage was neither re-specified nor written
        assert_eq!(device.map_count(handle), 2);
        assert_eq!(device.read(handle, 0, 8), Some(vec![2; 8]));
        assert!(buffer.is_allocated());
    }

    #[test]
    fn failed_restore_keeps_previous_target() {
        let (device, session) = setup(short_timeout(UploadConfig::minimal()));

        let mut first = BufferResource::new(device.clone());
        first.upload(&session, &[1; 8], BufferCategory::Index).unwrap();
        device.set_fence_behavior(FenceBehavior::Never);
        first.upload(&session, &[2; 8], BufferCategory::Index).unwrap();
        first.release();

        session.rewind();
        let mut second = BufferResource::new(device.clone());
        let before = (second.category(), second.target());
        let err = second.upload(&session, &[3; 8], BufferCategory::Index).unwrap_err();

        assert_eq!(err.kind(), UploadErrorKind::SynchronizationTimeout);
        assert!(!second.is_allocated());
        assert_eq!((second.category(), second.target()), before);
        assert_eq!(before, (BufferCategory::Vertex, BindingTarget::ArrayBuffer));
    }

    #[test]
    fn failed_allocation_keeps_previous_target() {
        let (device, session) = setup(UploadConfig::minimal());
        let mut buffer = BufferResource::new(device.clone());
        device.fail_next_storage(DeviceError::OutOfMemory);

        buffer.upload(&session, &[1; 8], BufferCategory::Index).unwrap_err();
        assert!(!buffer.is_allocated());
        assert_eq!(buffer.target(), BindingTarget::ArrayBuffer);
    }
}
