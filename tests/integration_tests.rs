//! Integration tests for gpubuf.

use gpubuf::{
    AllocationFailure, BindingTarget, BufferCategory, BufferResource, CollectingSink,
    DeviceCapabilities, DeviceErrorCode, DummyDevice, FenceBehavior, UploadConfig, UploadError,
    UploadErrorKind, UploadSession, UploadStrategy,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn setup(config: UploadConfig) -> (Arc<DummyDevice>, UploadSession) {
    let device = Arc::new(DummyDevice::new());
    let session = UploadSession::new(device.clone(), config);
    (device, session)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_upload_round_trip() {
    let (_device, session) = setup(UploadConfig::default());
    let mut buffer = BufferResource::new(session.device().clone());
    let data = pattern(4096);

    let receipt = buffer
        .upload(&session, &data, BufferCategory::Vertex)
        .unwrap();
    assert_eq!(receipt.bytes, data.len());
    assert_eq!(buffer.read_back(data.len()), Some(data));
    assert_eq!(buffer.category(), BufferCategory::Vertex);
    assert_eq!(buffer.target(), BindingTarget::ArrayBuffer);
}

#[test]
fn test_large_upload_uses_parallel_copy() {
    let config = UploadConfig::default().with_parallel_copy(1024, 4);
    let (_device, session) = setup(config);
    let mut buffer = BufferResource::new(session.device().clone());
    let data = pattern(64 * 1024 + 7);

    buffer.upload(&session, &data, BufferCategory::Index).unwrap();
    assert_eq!(buffer.read_back(data.len()), Some(data));
}

#[test]
fn test_oversized_upload_keeps_contents() {
    let (_device, session) = setup(UploadConfig::minimal());
    let mut buffer = BufferResource::new(session.device().clone());
    let data = pattern(64);
    buffer.upload(&session, &data, BufferCategory::Vertex).unwrap();

    let err = buffer
        .upload(&session, &pattern(65), BufferCategory::Vertex)
        .unwrap_err();
    assert_eq!(
        err,
        UploadError::AllocationFailure(AllocationFailure::ExceedsCapacity {
            requested: 65,
            capacity: 64,
        })
    );
    assert_eq!(buffer.capacity(), 64);
    assert_eq!(buffer.read_back(64), Some(data));
    assert_eq!(buffer.last_error(), Some(&err));
}

#[test]
fn test_incompatible_category_is_rejected() {
    let (_device, session) = setup(UploadConfig::minimal());
    let mut buffer = BufferResource::new(session.device().clone());
    buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap();

    let err = buffer
        .upload(&session, &[2; 8], BufferCategory::Index)
        .unwrap_err();
    assert_eq!(err.kind(), UploadErrorKind::IncompatibleCategory);
    assert_eq!(
        buffer.error_message().as_deref(),
        Some("Trying to upload index data to incompatible vertex buffer")
    );
    assert_eq!(buffer.read_back(8), Some(vec![1; 8]));

    // A later successful upload clears the error
    buffer.upload(&session, &[3; 8], BufferCategory::Vertex).unwrap();
    assert!(buffer.last_error().is_none());
}

#[test]
fn test_recovery_restores_category_and_capacity() {
    let (device, session) = setup(UploadConfig::default());

    let mut a = BufferResource::new(device.clone());
    a.upload(&session, &pattern(256), BufferCategory::Index).unwrap();
    let (handle, capacity, category) = (a.handle(), a.capacity(), a.category());
    assert!(a.release());

    session.rewind();
    let mut b = BufferResource::new(device.clone());
    let receipt = b.upload(&session, &pattern(100), BufferCategory::Index).unwrap();

    assert_eq!(receipt.slot, 0);
    assert!(receipt.restored);
    assert!(!receipt.allocated);
    assert_eq!(b.handle(), handle);
    assert_eq!(b.capacity(), capacity);
    assert_eq!(b.category(), category);
    assert_eq!(session.stats().restores, 1);
}

#[test]
fn test_recovery_rejects_other_category() {
    let (device, session) = setup(UploadConfig::default());

    let mut a = BufferResource::new(device.clone());
    a.upload(&session, &[1; 16], BufferCategory::Vertex).unwrap();
    a.release();

    session.rewind();
    let mut b = BufferResource::new(device.clone());
    let err = b.upload(&session, &[1; 16], BufferCategory::Index).unwrap_err();
    assert_eq!(err.kind(), UploadErrorKind::IncompatibleCategory);
    assert!(!b.is_allocated());
}

#[test]
fn test_recovery_disabled_always_allocates() {
    let (device, session) = setup(UploadConfig::minimal().with_recovery(false));

    let mut a = BufferResource::new(device.clone());
    a.upload(&session, &[1; 16], BufferCategory::Vertex).unwrap();
    a.release();

    session.rewind();
    let mut b = BufferResource::new(device.clone());
    let receipt = b.upload(&session, &[1; 16], BufferCategory::Vertex).unwrap();
    assert!(receipt.allocated);
    assert!(session.recovery().is_empty());
}

#[test]
fn test_invalidate_releases_storage() {
    let (device, session) = setup(UploadConfig::default());

    let mut a = BufferResource::new(device.clone());
    a.upload(&session, &[1; 16], BufferCategory::Vertex).unwrap();
    let handle = a.handle().unwrap();
    a.release();
    assert!(device.is_live(handle));
    assert_eq!(session.recovery().retained_bytes(), 16);

    assert!(session.invalidate(0));
    assert!(session.recovery().get(0).is_none());
    assert!(!device.is_live(handle));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_concurrent_uploads_take_distinct_slots() {
    let device = Arc::new(DummyDevice::new());
    let session = Arc::new(UploadSession::new(device.clone(), UploadConfig::minimal()));
    let slots = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let device = device.clone();
            let session = session.clone();
            let slots = slots.clone();
            thread::spawn(move || {
                let mut buffers = Vec::new();
                for i in 0..16 {
                    let mut buffer = BufferResource::new(device.clone());
                    let receipt = buffer
                        .upload(&session, &[(t * 16 + i) as u8; 32], BufferCategory::Vertex)
                        .unwrap();
                    assert!(receipt.allocated);
                    slots.lock().unwrap().push(receipt.slot);
                    buffers.push(buffer);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let slots = slots.lock().unwrap();
    let unique: HashSet<_> = slots.iter().copied().collect();
    assert_eq!(slots.len(), 128);
    assert_eq!(unique.len(), 128);
    assert_eq!(session.recovery().occupied(), 128);
    assert_eq!(session.stats().allocations, 128);
}

#[test]
fn test_map_per_call_round_trip_and_unmap() {
    let (device, session) =
        setup(UploadConfig::minimal().with_strategy(UploadStrategy::MapPerCall));
    let mut buffer = BufferResource::new(device.clone());
    let data = pattern(48);

    buffer.upload(&session, &data, BufferCategory::Texture).unwrap();
    let handle = buffer.handle().unwrap();
    assert!(!device.is_mapped(handle));
    assert_eq!(buffer.target(), BindingTarget::TextureBuffer);
    assert_eq!(buffer.read_back(48), Some(data));

    device.fail_next_map();
    let err = buffer.upload(&session, &[9; 8], BufferCategory::Texture).unwrap_err();
    assert_eq!(err, UploadError::AllocationFailure(AllocationFailure::MapFailed));
    assert!(!device.is_mapped(handle));
    assert!(buffer.is_allocated());
}

#[test]
fn test_fence_timeout() {
    let config = UploadConfig::minimal()
        .with_fence_timeout(Duration::from_millis(20))
        .with_poll_interval(Duration::from_millis(1));
    let (device, session) = setup(config);
    let mut buffer = BufferResource::new(device.clone());

    buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap();
    device.set_fence_behavior(FenceBehavior::Never);
    buffer.upload(&session, &[2; 8], BufferCategory::Vertex).unwrap();

    let start = Instant::now();
    let err = buffer.upload(&session, &[3; 8], BufferCategory::Vertex).unwrap_err();
    assert_eq!(err.kind(), UploadErrorKind::SynchronizationTimeout);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(session.stats().fence_timeouts, 1);
    assert!(buffer.wait_idle(Duration::from_millis(5)).is_err());

    device.signal_all_fences();
    buffer.wait_idle(Duration::from_millis(5)).unwrap();
    buffer.upload(&session, &[4; 8], BufferCategory::Vertex).unwrap();
    assert_eq!(buffer.read_back(8), Some(vec![4; 8]));
}

#[test]
fn test_drained_device_error_aborts_allocation() {
    let (device, session) = setup(UploadConfig::minimal());
    let sink = Arc::new(CollectingSink::new());
    session.set_diagnostic_sink(sink.clone());
    let mut buffer = BufferResource::new(device.clone());

    device.raise_on_next_storage(DeviceErrorCode::OutOfMemory);
    let err = buffer.upload(&session, &[1; 8], BufferCategory::Vertex).unwrap_err();
    assert_eq!(
        err,
        UploadError::AllocationFailure(AllocationFailure::DeviceErrors(vec![
            DeviceErrorCode::OutOfMemory
        ]))
    );
    assert!(buffer.handle().is_none());
    assert_eq!(device.destroyed_count(), 1);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(sink.codes(), vec!["GB202"]);
    assert!(session.recovery().is_empty());

    // The buffer recovers on the next upload
    buffer.upload(&session, &[2; 8], BufferCategory::Vertex).unwrap();
    assert!(buffer.is_allocated());
}

#[test]
fn test_rewind_reuses_slot_zero() {
    let (device, session) = setup(UploadConfig::minimal());
    let mut buffer = BufferResource::new(device.clone());
    buffer.upload(&session, &[1; 4], BufferCategory::Vertex).unwrap();
    buffer.upload(&session, &[1; 4], BufferCategory::Vertex).unwrap();
    assert_eq!(session.sequence(), 2);

    session.rewind();
    let receipt = buffer.upload(&session, &[1; 4], BufferCategory::Vertex).unwrap();
    assert_eq!(receipt.slot, 0);
}

#[test]
fn test_texture_falls_back_without_texture_buffers() {
    let device = Arc::new(DummyDevice::with_capabilities(DeviceCapabilities {
        texture_buffers: false,
        persistent_mapping: true,
    }));
    let session = UploadSession::with_defaults(device.clone());
    let mut texture = BufferResource::new(device.clone());

    texture.upload(&session, &[7; 12], BufferCategory::Texture).unwrap();
    assert_eq!(texture.target(), BindingTarget::ArrayBuffer);
    assert_eq!(texture.category(), BufferCategory::Vertex);

    // Vertex data is accepted by the same buffer
    texture.upload(&session, &[8; 12], BufferCategory::Vertex).unwrap();
}

#[test]
fn test_no_persistent_mapping_uses_map_per_call() {
    let device = Arc::new(DummyDevice::with_capabilities(DeviceCapabilities {
        texture_buffers: true,
        persistent_mapping: false,
    }));
    let session = UploadSession::with_defaults(device.clone());
    let mut buffer = BufferResource::new(device.clone());

    buffer.upload(&session, &[5; 32], BufferCategory::Vertex).unwrap();
    let allocation = buffer.allocation().unwrap();
    assert!(!allocation.is_persistent());
    assert!(!device.is_mapped(allocation.handle()));
    assert_eq!(buffer.read_back(32), Some(vec![5; 32]));
}

#[test]
fn test_bind_after_upload() {
    let (device, session) = setup(UploadConfig::minimal());
    let mut buffer = BufferResource::new(device.clone());
    assert!(!buffer.bind());

    buffer.upload(&session, &[1; 4], BufferCategory::Index).unwrap();
    assert!(buffer.bind());
    assert_eq!(device.bound(BindingTarget::ElementArrayBuffer), buffer.handle());
    assert!(buffer.unbind());
    assert_eq!(device.bound(BindingTarget::ElementArrayBuffer), None);
}

#[test]
fn test_stats_track_uploads() {
    let (device, session) = setup(UploadConfig::minimal());
    let mut buffer = BufferResource::new(device.clone());
    buffer.upload(&session, &[1; 100], BufferCategory::Vertex).unwrap();
    buffer.upload(&session, &[1; 40], BufferCategory::Vertex).unwrap();
    let _ = buffer.upload(&session, &[], BufferCategory::Vertex);

    let stats = session.stats();
    assert_eq!(stats.uploads, 2);
    assert_eq!(stats.failed_uploads, 1);
    assert_eq!(stats.bytes_uploaded, 140);
    assert_eq!(stats.peak_upload_bytes, 100);
    assert_eq!(stats.allocations, 1);
}
