//! Vulkan backend for the device interface
//!
//! Buffers are allocated through `gpu-allocator` in host-visible, coherent
//! memory, which the allocator keeps persistently mapped. Fences are real
//! `VkFence`s submitted on the upload queue.

pub mod buffer;
pub mod device;

pub use buffer::VulkanBuffer;
pub use device::VulkanDevice;
