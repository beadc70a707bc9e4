//! Vulkan device implementation

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk::{self, Handle};
use crossbeam_queue::SegQueue;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use super::super::traits::*;
use super::buffer::VulkanBuffer;
use crate::sync::mutex::Mutex;

/// Buffer name plus optional storage
struct BufferEntry {
    storage: Option<VulkanBuffer>,
    flags: StorageFlags,
}

/// Vulkan-based GPU device
pub struct VulkanDevice {
    /// Vulkan device
    device: Arc<ash::Device>,
    /// Queue fences are submitted on; externally synchronized
    queue: Mutex<vk::Queue>,
    /// Memory sub-allocator
    allocator: Mutex<Allocator>,
    /// Live buffers by id
    buffers: Mutex<HashMap<BufferId, BufferEntry>>,
    /// Binding state; Vulkan binds at record time, so this is bookkeeping
    /// the command layer reads when it records draws
    bindings: Mutex<HashMap<BindingTarget, BufferId>>,
    /// Drained by `drain_errors`
    errors: SegQueue<DeviceErrorCode>,
    next_id: AtomicU64,
}

impl VulkanDevice {
    /// Create a new Vulkan device wrapper
    pub fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
        queue: vk::Queue,
    ) -> Result<Self, DeviceError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| DeviceError::BackendError(e.to_string()))?;

        Ok(Self {
            device,
            queue: Mutex::new(queue),
            allocator: Mutex::new(allocator),
            buffers: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            errors: SegQueue::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Raw buffer handle currently backing `id`, for command recording.
    pub fn vk_buffer(&self, id: BufferId) -> Option<vk::Buffer> {
        self.buffers
            .lock()
            .get(&id)
            .and_then(|entry| entry.storage.as_ref().map(|s| s.vk_buffer))
    }

    /// Buffer bound at `target`.
    pub fn bound(&self, target: BindingTarget) -> Option<BufferId> {
        self.bindings.lock().get(&target).copied()
    }

    fn record(&self, result: vk::Result) {
        let code = match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                DeviceErrorCode::OutOfMemory
            }
            vk::Result::ERROR_MEMORY_MAP_FAILED => DeviceErrorCode::InvalidOperation,
            other => DeviceErrorCode::Unknown(other.as_raw() as u32),
        };
        self.errors.push(code);
    }
}

impl GpuDevice for VulkanDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            texture_buffers: true,
            persistent_mapping: true,
        }
    }

    fn create_buffer(&self) -> Result<BufferId, DeviceError> {
        let id = BufferId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
            .ok_or(DeviceError::OutOfMemory)?;
        self.buffers.lock().insert(
            id,
            BufferEntry {
                storage: None,
                flags: StorageFlags::NONE,
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        let entry = self.buffers.lock().remove(&id);
        self.bindings.lock().retain(|_, bound| *bound != id);
        if let Some(storage) = entry.and_then(|e| e.storage) {
            storage.destroy(&self.device, &mut self.allocator.lock());
        }
    }

    fn bind_buffer(&self, target: BindingTarget, id: Option<BufferId>) {
        let mut bindings = self.bindings.lock();
        match id {
            Some(id) => {
                bindings.insert(target, id);
            }
            None => {
                bindings.remove(&target);
            }
        }
    }

    fn allocate_storage(
        &self,
        id: BufferId,
        target: BindingTarget,
        size: usize,
        flags: StorageFlags,
    ) -> Result<(), DeviceError> {
        if size == 0 {
            self.errors.push(DeviceErrorCode::InvalidValue);
            return Err(DeviceError::InvalidSize);
        }

        let mut buffers = self.buffers.lock();
        let entry = buffers.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;

        if let Some(existing) = &entry.storage {
            if !entry.flags.contains(StorageFlags::DYNAMIC_STORAGE) {
                self.errors.push(DeviceErrorCode::InvalidOperation);
                return Err(DeviceError::InvalidOperation("immutable storage respecified"));
            }
            // Host-coherent memory of the same size is reused; callers wait on
            // the buffer's fence before writing.
            if existing.size() == size {
                entry.flags = flags;
                return Ok(());
            }
        }

        let mut allocator = self.allocator.lock();
        let storage = VulkanBuffer::new(&self.device, &mut allocator, target, size).map_err(|e| {
            self.errors.push(DeviceErrorCode::OutOfMemory);
            e
        })?;
        if let Some(old) = entry.storage.replace(storage) {
            old.destroy(&self.device, &mut allocator);
        }
        entry.flags = flags;
        Ok(())
    }

    fn map_range(
        &self,
        id: BufferId,
        _target: BindingTarget,
        offset: usize,
        len: usize,
        _access: MapAccess,
    ) -> Option<NonNull<u8>> {
        let buffers = self.buffers.lock();
        let ptr = buffers
            .get(&id)
            .and_then(|entry| entry.storage.as_ref())
            .and_then(|storage| storage.mapped_ptr(offset, len));
        if ptr.is_none() {
            self.record(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        ptr
    }

    fn unmap(&self, _id: BufferId, _target: BindingTarget) {
        // gpu-allocator keeps host-visible blocks mapped for their lifetime
    }

    fn insert_fence(&self) -> Result<FenceId, DeviceError> {
        let info = vk::FenceCreateInfo::builder();
        let fence = unsafe { self.device.create_fence(&info, None) }.map_err(|e| {
            self.record(e);
            DeviceError::BackendError(e.to_string())
        })?;

        let queue = self.queue.lock();
        let submitted = unsafe { self.device.queue_submit(*queue, &[], fence) };
        if let Err(e) = submitted {
            unsafe { self.device.destroy_fence(fence, None) };
            self.record(e);
            return Err(DeviceError::BackendError(e.to_string()));
        }

        FenceId::new(fence.as_raw()).ok_or(DeviceError::InvalidOperation("null fence"))
    }

    fn fence_status(&self, fence: FenceId) -> FenceStatus {
        match unsafe { self.device.get_fence_status(vk::Fence::from_raw(fence.get())) } {
            Ok(true) => FenceStatus::Signaled,
            Ok(false) => FenceStatus::Pending,
            Err(e) => {
                // A lost device never signals; the waiter's timeout reports it
                self.record(e);
                FenceStatus::Pending
            }
        }
    }

    fn delete_fence(&self, fence: FenceId) {
        unsafe {
            self.device
                .destroy_fence(vk::Fence::from_raw(fence.get()), None)
        };
    }

    fn drain_errors(&self) -> Vec<DeviceErrorCode> {
        std::iter::from_fn(|| self.errors.pop()).collect()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let mut allocator = self.allocator.lock();
        for (_, entry) in self.buffers.lock().drain() {
            if let Some(storage) = entry.storage {
                storage.destroy(&self.device, &mut allocator);
            }
        }
    }
}
