//! Device allocations and their mapped memory.
//!
//! A [`SharedAllocation`] is one device buffer with fixed storage. It is held
//! through an `Arc` by the buffer resource using it and by any recovery
//! snapshot taken of it; the device buffer is unmapped and destroyed when the
//! last holder lets go.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::gpu::{BindingTarget, BufferId, GpuDevice, MapAccess, StorageFlags};
use crate::resource::BufferCategory;
use crate::sync::mutex::{Mutex, MutexGuard};
use crate::sync::Fence;
use crate::upload::AllocationFailure;

/// CPU-visible window onto buffer storage.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is only reached through the owning allocation's mutex
// (or a `MapGuard` borrowed on one thread), so it is never aliased across threads.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// mapping is released.
    pub(crate) unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Length of the mapped range in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: guaranteed by the constructor contract
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: guaranteed by the constructor contract; `&mut self` is unique
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Scoped mapping that unmaps when dropped, on every exit path.
pub(crate) struct MapGuard<'a> {
    device: &'a dyn GpuDevice,
    handle: BufferId,
    target: BindingTarget,
    region: MappedRegion,
}

impl<'a> MapGuard<'a> {
    /// Map the first `len` bytes of the buffer.
    pub(crate) fn map(
        device: &'a dyn GpuDevice,
        handle: BufferId,
        target: BindingTarget,
        len: usize,
        access: MapAccess,
    ) -> Option<Self> {
        let ptr = device.map_range(handle, target, 0, len, access)?;
        Some(Self {
            device,
            handle,
            target,
            // SAFETY: the device keeps the range valid until `unmap`, which
            // only this guard calls
            region: unsafe { MappedRegion::new(ptr, len) },
        })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }
}

impl Drop for MapGuard<'_> {
    fn drop(&mut self) {
        self.device.unmap(self.handle, self.target);
    }
}

/// Mutable part of an allocation, serialized across every resource sharing it.
#[derive(Debug)]
pub(crate) struct AllocationState {
    /// Persistent mapping, present for the persistent-mapped strategy
    pub(crate) mapping: Option<MappedRegion>,
    /// Last fence armed after a write
    pub(crate) fence: Fence,
}

/// One device buffer with fixed storage.
pub struct SharedAllocation {
    device: Arc<dyn GpuDevice>,
    handle: BufferId,
    target: BindingTarget,
    capacity: usize,
    persistent: bool,
    state: Mutex<AllocationState>,
}

impl SharedAllocation {
    /// Give `handle` storage of `size` bytes, and map it once if `persistent`.
    ///
    /// Takes ownership of `handle`: on failure the device buffer is destroyed.
    pub(crate) fn create(
        device: &Arc<dyn GpuDevice>,
        handle: BufferId,
        target: BindingTarget,
        size: usize,
        persistent: bool,
    ) -> Result<Self, AllocationFailure> {
        let allocation = Self {
            device: Arc::clone(device),
            handle,
            target,
            capacity: size,
            persistent,
            state: Mutex::new(AllocationState {
                mapping: None,
                fence: Fence::new(Arc::clone(device)),
            }),
        };
        if size == 0 {
            return Err(AllocationFailure::ZeroSize);
        }

        let flags = if persistent {
            StorageFlags::PERSISTENT_WRITE
        } else {
            StorageFlags::DYNAMIC_WRITE
        };
        device.bind_buffer(target, Some(handle));
        if let Err(err) = device.allocate_storage(handle, target, size, flags) {
            // The call already failed; the queued codes add nothing
            device.drain_errors();
            return Err(AllocationFailure::Device(err));
        }

        let drained = device.drain_errors();
        if !drained.is_empty() {
            return Err(AllocationFailure::DeviceErrors(drained));
        }

        if persistent {
            let access = MapAccess::WRITE | MapAccess::PERSISTENT | MapAccess::COHERENT;
            let Some(ptr) = device.map_range(handle, target, 0, size, access) else {
                device.drain_errors();
                return Err(AllocationFailure::MapFailed);
            };
            // SAFETY: persistent mappings stay valid until `unmap` in `Drop`
            allocation.state.lock().mapping = Some(unsafe { MappedRegion::new(ptr, size) });
        }

        Ok(allocation)
    }

    /// Device buffer id.
    pub fn handle(&self) -> BufferId {
        self.handle
    }

    /// Binding target fixed at creation.
    pub fn target(&self) -> BindingTarget {
        self.target
    }

    /// Category served by the binding target.
    pub fn category(&self) -> BufferCategory {
        BufferCategory::from_target(self.target)
    }

    /// Storage size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the storage is persistently mapped.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn device(&self) -> &dyn GpuDevice {
        &*self.device
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AllocationState> {
        self.state.lock()
    }

    /// Whether the last armed fence has signaled.
    pub fn is_idle(&self) -> bool {
        self.lock().fence.is_signaled()
    }

    /// Copy the first `len` bytes of the storage (clamped to capacity).
    pub fn read_back(&self, len: usize) -> Option<Vec<u8>> {
        let len = len.min(self.capacity);
        let state = self.lock();
        if let Some(region) = &state.mapping {
            return Some(region.as_slice()[..len].to_vec());
        }
        let guard = MapGuard::map(self.device(), self.handle, self.target, len, MapAccess::READ)?;
        Some(guard.bytes().to_vec())
    }
}

impl fmt::Debug for SharedAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedAllocation")
            .field("handle", &self.handle)
            .field("target", &self.target)
            .field("capacity", &self.capacity)
            .field("persistent", &self.persistent)
            .finish()
    }
}

impl Drop for SharedAllocation {
    fn drop(&mut self) {
        if self.lock().mapping.take().is_some() {
            self.device.unmap(self.handle, self.target);
        }
        self.device.destroy_buffer(self.handle);
    }
}
