//! Dummy GPU device implementation for testing
//!
//! This device keeps buffer storage in RAM and doesn't require actual GPU hardware.
//! It tracks bindings, mappings and fences, supports fault injection, and lets
//! tests read back what an upload wrote.

use std::collections::{HashMap, VecDeque};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::SegQueue;

use super::traits::*;
use crate::sync::mutex::Mutex;

/// Destroyed buffer ids kept for inspection
const DESTROYED_HISTORY: usize = 64;

/// How fences inserted on a [`DummyDevice`] behave when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceBehavior {
    /// Signaled on the first poll
    Immediate,
    /// Pending for the first `n` polls, signaled afterwards
    AfterPolls(u32),
    /// Never signaled (a wedged device)
    Never,
}

/// RAM storage of one dummy buffer
#[derive(Debug)]
struct DummyBuffer {
    /// Storage, `None` until `allocate_storage`
    data: Option<Box<[u8]>>,
    /// Flags the storage was created with
    flags: StorageFlags,
    /// Currently mapped range
    mapped: Option<(usize, usize)>,
    /// Number of successful `map_range` calls
    map_count: usize,
}

impl DummyBuffer {
    fn new() -> Self {
        Self {
            data: None,
            flags: StorageFlags::NONE,
            mapped: None,
            map_count: 0,
        }
    }
}

/// Faults to inject into the next device calls
#[derive(Debug, Default)]
struct FaultPlan {
    /// Reject the next storage request with this error
    fail_storage: Option<DeviceError>,
    /// Queue this code after the next storage request succeeds
    storage_error_code: Option<DeviceErrorCode>,
    /// Fail the next map request
    fail_map: bool,
    /// Reject storage requests above this size
    memory_limit: Option<usize>,
}

#[derive(Debug)]
struct DummyState {
    buffers: HashMap<BufferId, DummyBuffer>,
    bindings: HashMap<BindingTarget, BufferId>,
    /// Remaining pending polls per fence; `None` never signals
    fences: HashMap<FenceId, Option<u32>>,
    fence_behavior: FenceBehavior,
    faults: FaultPlan,
    /// Most recent destroyed ids, oldest first
    destroyed: VecDeque<BufferId>,
    destroyed_count: usize,
}

/// Dummy GPU device for testing
#[derive(Debug)]
pub struct DummyDevice {
    state: Mutex<DummyState>,
    errors: SegQueue<DeviceErrorCode>,
    capabilities: DeviceCapabilities,
    next_id: AtomicU64,
}

impl DummyDevice {
    /// Create a dummy device with full capabilities
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    /// Create a dummy device with limited support
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            state: Mutex::new(DummyState {
                buffers: HashMap::new(),
                bindings: HashMap::new(),
                fences: HashMap::new(),
                fence_behavior: FenceBehavior::Immediate,
                faults: FaultPlan::default(),
                destroyed: VecDeque::with_capacity(DESTROYED_HISTORY),
                destroyed_count: 0,
            }),
            errors: SegQueue::new(),
            capabilities,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_raw_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Set how fences inserted from now on behave.
    pub fn set_fence_behavior(&self, behavior: FenceBehavior) {
        self.state.lock().fence_behavior = behavior;
    }

    /// Signal every outstanding fence.
    pub fn signal_all_fences(&self) {
        for remaining in self.state.lock().fences.values_mut() {
            *remaining = Some(0);
        }
    }

    /// Reject the next storage request with `error`.
    pub fn fail_next_storage(&self, error: DeviceError) {
        self.state.lock().faults.fail_storage = Some(error);
    }

    /// Accept the next storage request but queue `code` on the error queue.
    pub fn raise_on_next_storage(&self, code: DeviceErrorCode) {
        self.state.lock().faults.storage_error_code = Some(code);
    }

    /// Fail the next map request.
    pub fn fail_next_map(&self) {
        self.state.lock().faults.fail_map = true;
    }

    /// Reject storage requests larger than `limit` bytes.
    pub fn set_memory_limit(&self, limit: Option<usize>) {
        self.state.lock().faults.memory_limit = limit;
    }

    /// Queue an error as if a device call had failed.
    pub fn push_error(&self, code: DeviceErrorCode) {
        self.errors.push(code);
    }

    /// Number of buffers that exist on the device.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of fences that have not been deleted.
    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    /// Whether `id` names a live buffer.
    pub fn is_live(&self, id: BufferId) -> bool {
        self.state.lock().buffers.contains_key(&id)
    }

    /// The most recently destroyed buffers (at most 64), oldest first.
    pub fn destroyed(&self) -> Vec<BufferId> {
        self.state.lock().destroyed.iter().copied().collect()
    }

    /// Number of buffers destroyed over the device's lifetime.
    pub fn destroyed_count(&self) -> usize {
        self.state.lock().destroyed_count
    }

    /// Buffer bound at `target`.
    pub fn bound(&self, target: BindingTarget) -> Option<BufferId> {
        self.state.lock().bindings.get(&target).copied()
    }

    /// Whether the buffer currently has a mapping open.
    pub fn is_mapped(&self, id: BufferId) -> bool {
        self.state
            .lock()
            .buffers
            .get(&id)
            .map_or(false, |b| b.mapped.is_some())
    }

    /// Number of successful map requests on the buffer.
    pub fn map_count(&self, id: BufferId) -> usize {
        self.state.lock().buffers.get(&id).map_or(0, |b| b.map_count)
    }

    /// Storage size of the buffer, `None` when it has no storage.
    pub fn storage_size(&self, id: BufferId) -> Option<usize> {
        self.state
            .lock()
            .buffers
            .get(&id)
            .and_then(|b| b.data.as_ref().map(|d| d.len()))
    }

    /// Flags the buffer's storage was created with.
    pub fn storage_flags(&self, id: BufferId) -> Option<StorageFlags> {
        self.state.lock().buffers.get(&id).map(|b| b.flags)
    }

    /// Copy `len` bytes of the buffer's storage starting at `offset`.
    pub fn read(&self, id: BufferId, offset: usize, len: usize) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let data = state.buffers.get(&id)?.data.as_ref()?;
        let end = offset.checked_add(len)?;
        data.get(offset..end).map(|bytes| bytes.to_vec())
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for DummyDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&self) -> Result<BufferId, DeviceError> {
        let id = BufferId::new(self.next_raw_id()).ok_or(DeviceError::OutOfMemory)?;
        self.state.lock().buffers.insert(id, DummyBuffer::new());
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(&id).is_some() {
            state.bindings.retain(|_, bound| *bound != id);
            if state.destroyed.len() == DESTROYED_HISTORY {
                state.destroyed.pop_front();
            }
            state.destroyed.push_back(id);
            state.destroyed_count += 1;
        }
    }

    fn bind_buffer(&self, target: BindingTarget, id: Option<BufferId>) {
        let mut state = self.state.lock();
        match id {
            Some(id) if state.buffers.contains_key(&id) => {
                state.bindings.insert(target, id);
            }
            Some(_) => self.errors.push(DeviceErrorCode::InvalidValue),
            None => {
                state.bindings.remove(&target);
            }
        }
    }

    fn allocate_storage(
        &self,
        id: BufferId,
        _target: BindingTarget,
        size: usize,
        flags: StorageFlags,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();

        if let Some(error) = state.faults.fail_storage.take() {
            self.errors.push(DeviceErrorCode::OutOfMemory);
            return Err(error);
        }
        if size == 0 {
            self.errors.push(DeviceErrorCode::InvalidValue);
            return Err(DeviceError::InvalidSize);
        }
        if state.faults.memory_limit.map_or(false, |limit| size > limit) {
            self.errors.push(DeviceErrorCode::OutOfMemory);
            return Err(DeviceError::OutOfMemory);
        }
        let pending_code = state.faults.storage_error_code.take();

        let buffer = state
            .buffers
            .get_mut(&id)
            .ok_or(DeviceError::UnknownBuffer(id))?;

        if buffer.mapped.is_some() {
            self.errors.push(DeviceErrorCode::InvalidOperation);
            return Err(DeviceError::InvalidOperation("storage respecified while mapped"));
        }
        if buffer.data.is_some() && !buffer.flags.contains(StorageFlags::DYNAMIC_STORAGE) {
            self.errors.push(DeviceErrorCode::InvalidOperation);
            return Err(DeviceError::InvalidOperation("immutable storage respecified"));
        }

        buffer.data = Some(vec![0u8; size].into_boxed_slice());
        buffer.flags = flags;

        if let Some(code) = pending_code {
            self.errors.push(code);
        }
        Ok(())
    }

    fn map_range(
        &self,
        id: BufferId,
        _target: BindingTarget,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();

        if std::mem::take(&mut state.faults.fail_map) {
            self.errors.push(DeviceErrorCode::OutOfMemory);
            return None;
        }

        let Some(buffer) = state.buffers.get_mut(&id) else {
            self.errors.push(DeviceErrorCode::InvalidValue);
            return None;
        };
        let flags = buffer.flags;
        let readable = !access.contains(MapAccess::READ) || flags.contains(StorageFlags::MAP_READ);
        let writable = !access.contains(MapAccess::WRITE) || flags.contains(StorageFlags::MAP_WRITE);
        let persistent_ok =
            !access.contains(MapAccess::PERSISTENT) || flags.contains(StorageFlags::MAP_PERSISTENT);
        if buffer.mapped.is_some() || !readable || !writable || !persistent_ok || len == 0 {
            self.errors.push(DeviceErrorCode::InvalidOperation);
            return None;
        }

        let data = buffer.data.as_mut()?;
        let end = offset.checked_add(len)?;
        if end > data.len() {
            self.errors.push(DeviceErrorCode::InvalidValue);
            return None;
        }

        buffer.mapped = Some((offset, len));
        buffer.map_count += 1;
        // The boxed slice does not move while the buffer is mapped: storage
        // cannot be respecified or dropped until `unmap`/`destroy_buffer`.
        NonNull::new(data[offset..].as_mut_ptr())
    }

    fn unmap(&self, id: BufferId, _target: BindingTarget) {
        let mut state = self.state.lock();
        match state.buffers.get_mut(&id) {
            Some(buffer) if buffer.mapped.is_some() => buffer.mapped = None,
            _ => self.errors.push(DeviceErrorCode::InvalidOperation),
        }
    }

    fn insert_fence(&self) -> Result<FenceId, DeviceError> {
        let id = FenceId::new(self.next_raw_id()).ok_or(DeviceError::OutOfMemory)?;
        let mut state = self.state.lock();
        let remaining = match state.fence_behavior {
            FenceBehavior::Immediate => Some(0),
            FenceBehavior::AfterPolls(n) => Some(n),
            FenceBehavior::Never => None,
        };
        state.fences.insert(id, remaining);
        Ok(id)
    }

    fn fence_status(&self, fence: FenceId) -> FenceStatus {
        let mut state = self.state.lock();
        match state.fences.get_mut(&fence) {
            Some(Some(0)) => FenceStatus::Signaled,
            Some(Some(remaining)) => {
                *remaining -= 1;
                FenceStatus::Pending
            }
            Some(None) => FenceStatus::Pending,
            // Deleted fences have nothing left to wait for
            None => FenceStatus::Signaled,
        }
    }

    fn delete_fence(&self, fence: FenceId) {
        self.state.lock().fences.remove(&fence);
    }

    fn drain_errors(&self) -> Vec<DeviceErrorCode> {
        std::iter::from_fn(|| self.errors.pop()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: BindingTarget = BindingTarget::ArrayBuffer;

    #[test]
    fn test_storage_and_readback() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device
            .allocate_storage(id, TARGET, 16, StorageFlags::PERSISTENT_WRITE)
            .unwrap();

        let ptr = device
            .map_range(id, TARGET, 0, 16, MapAccess::WRITE | MapAccess::PERSISTENT)
            .unwrap();
        unsafe { ptr.as_ptr().write_bytes(0xAB, 16) };

        assert_eq!(device.storage_size(id), Some(16));
        assert_eq!(device.read(id, 0, 4), Some(vec![0xAB; 4]));
        assert!(device.is_mapped(id));
    }

    #[test]
    fn test_immutable_storage_cannot_be_respecified() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device
            .allocate_storage(id, TARGET, 8, StorageFlags::PERSISTENT_WRITE)
            .unwrap();

        let err = device
            .allocate_storage(id, TARGET, 8, StorageFlags::PERSISTENT_WRITE)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidOperation(_)));
        assert_eq!(device.drain_errors(), vec![DeviceErrorCode::InvalidOperation]);
    }

    #[test]
    fn test_dynamic_storage_orphans() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device
            .allocate_storage(id, TARGET, 4, StorageFlags::DYNAMIC_WRITE)
            .unwrap();
        let ptr = device.map_range(id, TARGET, 0, 4, MapAccess::WRITE).unwrap();
        unsafe { ptr.as_ptr().write_bytes(7, 4) };
        device.unmap(id, TARGET);

        device
            .allocate_storage(id, TARGET, 4, StorageFlags::DYNAMIC_WRITE)
            .unwrap();
        assert_eq!(device.read(id, 0, 4), Some(vec![0; 4]));
    }

    #[test]
    fn test_map_out_of_range_fails() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device
            .allocate_storage(id, TARGET, 4, StorageFlags::DYNAMIC_WRITE)
            .unwrap();
        assert!(device.map_range(id, TARGET, 2, 4, MapAccess::WRITE).is_none());
        assert_eq!(device.drain_errors(), vec![DeviceErrorCode::InvalidValue]);
    }

    #[test]
    fn test_destroy_clears_bindings() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device.bind_buffer(TARGET, Some(id));
        assert_eq!(device.bound(TARGET), Some(id));

        device.destroy_buffer(id);
        assert_eq!(device.bound(TARGET), None);
        assert_eq!(device.destroyed(), vec![id]);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_fence_behaviors() {
        let device = DummyDevice::new();
        let fast = device.insert_fence().unwrap();
        assert_eq!(device.fence_status(fast), FenceStatus::Signaled);

        device.set_fence_behavior(FenceBehavior::Never);
        let stuck = device.insert_fence().unwrap();
        assert_eq!(device.fence_status(stuck), FenceStatus::Pending);
        device.signal_all_fences();
        assert_eq!(device.fence_status(stuck), FenceStatus::Signaled);
    }

    #[test]
    fn test_injected_storage_error_is_queued() {
        let device = DummyDevice::new();
        let id = device.create_buffer().unwrap();
        device.raise_on_next_storage(DeviceErrorCode::InvalidEnum);
        device
            .allocate_storage(id, TARGET, 4, StorageFlags::PERSISTENT_WRITE)
            .unwrap();
        assert_eq!(device.drain_errors(), vec![DeviceErrorCode::InvalidEnum]);
        assert!(device.drain_errors().is_empty());
    }

    #[test]
    fn test_destroyed_history_is_bounded() {
        let device = DummyDevice::new();
        let ids: Vec<_> = (0..DESTROYED_HISTORY + 10)
            .map(|_| device.create_buffer().unwrap())
            .collect();
        for &id in &ids {
            device.destroy_buffer(id);
        }

        assert_eq!(device.destroyed_count(), ids.len());
        assert_eq!(device.destroyed(), ids[10..].to_vec());
    }
}
