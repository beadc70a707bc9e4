//! Vulkan buffer implementation

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;

use super::super::traits::{BindingTarget, DeviceError};

/// Vulkan-backed buffer storage
pub struct VulkanBuffer {
    /// Raw Vulkan buffer handle
    pub vk_buffer: vk::Buffer,
    /// Sub-allocation backing the buffer
    allocation: Option<Allocation>,
    /// Size in bytes
    size: usize,
}

impl VulkanBuffer {
    /// Create a buffer of `size` bytes usable at `target`, bound to
    /// persistently mapped host-visible memory.
    pub fn new(
        device: &ash::Device,
        allocator: &mut Allocator,
        target: BindingTarget,
        size: usize,
    ) -> Result<Self, DeviceError> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size as u64)
            .usage(usage_for(target))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let vk_buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(|_| DeviceError::InvalidSize)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(vk_buffer) };

        let allocation = match allocator.allocate(&AllocationCreateDesc {
            name: "gpubuf upload buffer",
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(vk_buffer, None) };
                return Err(DeviceError::BackendError(err.to_string()));
            }
        };

        let bound = unsafe {
            device.bind_buffer_memory(vk_buffer, allocation.memory(), allocation.offset())
        };
        if bound.is_err() {
            let _ = allocator.free(allocation);
            unsafe { device.destroy_buffer(vk_buffer, None) };
            return Err(DeviceError::OutOfMemory);
        }

        Ok(Self {
            vk_buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Host pointer at `offset`, if the memory is mapped and the range fits.
    pub fn mapped_ptr(&self, offset: usize, len: usize) -> Option<std::ptr::NonNull<u8>> {
        let end = offset.checked_add(len)?;
        if end > self.size {
            return None;
        }
        let base = self.allocation.as_ref()?.mapped_ptr()?.cast::<u8>();
        // SAFETY: offset + len is within the mapped allocation
        std::ptr::NonNull::new(unsafe { base.as_ptr().add(offset) })
    }

    /// Free the memory and destroy the buffer.
    pub fn destroy(mut self, device: &ash::Device, allocator: &mut Allocator) {
        if let Some(allocation) = self.allocation.take() {
            let _ = allocator.free(allocation);
        }
        unsafe { device.destroy_buffer(self.vk_buffer, None) };
    }
}

fn usage_for(target: BindingTarget) -> vk::BufferUsageFlags {
    let role = match target {
        BindingTarget::ArrayBuffer => vk::BufferUsageFlags::VERTEX_BUFFER,
        BindingTarget::ElementArrayBuffer => vk::BufferUsageFlags::INDEX_BUFFER,
        BindingTarget::TextureBuffer => {
            vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER
        }
    };
    role | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
}
