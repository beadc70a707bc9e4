//! GPU device interface
//!
//! Buffer resources talk to the device only through [`GpuDevice`].
//!
//! ## Backends
//! - `dummy`: RAM-backed device for tests and headless runs (always available)
//! - `vulkan`: Via the `ash` and `gpu-allocator` crates (enable `gpu-vulkan` feature)

// Always present for API stability: traits define the interface
pub mod traits;
pub use traits::{
    BindingTarget, BufferId, DeviceCapabilities, DeviceError, DeviceErrorCode, FenceId,
    FenceStatus, GpuDevice, MapAccess, StorageFlags,
};

// Dummy device for testing (always available)
pub mod dummy;
pub use dummy::{DummyDevice, FenceBehavior};

// Backend implementations are conditionally compiled
#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;
