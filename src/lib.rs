//! # gpubuf
//!
//! GPU buffer uploads with persistent mapping, fence-guarded writes and
//! slot-based storage recovery.
//!
//! ## Features
//!
//! - Vertex, index and texture buffers behind one [`BufferResource`] type
//! - Persistent-mapped uploads (map once, write through the same pointer)
//! - Map-per-call uploads with storage orphaning for devices without it
//! - Bounded fence waits before the CPU overwrites memory the GPU may read
//! - Recovery cache: rebuilt buffers adopt the storage recorded at their slot
//! - Parallel byte copy for large uploads
//! - Coded diagnostics through the `log` crate
//! - Optional Vulkan backend (`gpu-vulkan`)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gpubuf::{BufferCategory, BufferResource, DummyDevice, UploadSession};
//!
//! let device = Arc::new(DummyDevice::new());
//! let session = UploadSession::with_defaults(device.clone());
//!
//! let mut vertices = BufferResource::new(device);
//! let receipt = vertices
//!     .upload(&session, &[0u8; 64], BufferCategory::Vertex)
//!     .expect("upload");
//! assert!(receipt.allocated);
//! assert!(vertices.bind());
//! ```
//!
//! ## Recovery
//!
//! Every upload takes the next slot from its session. The first upload that
//! allocates storage records a snapshot at its slot; after
//! [`UploadSession::rewind`], a fresh buffer uploading at the same slot
//! adopts that storage instead of allocating. Snapshots keep their storage
//! alive until [`UploadSession::invalidate`] drops them.

pub mod diagnostics;
pub mod gpu;
pub mod resource;
pub mod sync;
pub mod upload;

mod util;

pub use gpu::{
    BindingTarget, BufferId, DeviceCapabilities, DeviceError, DeviceErrorCode, DummyDevice,
    FenceBehavior, GpuDevice,
};
pub use resource::{BufferCategory, BufferResource, SharedAllocation};
pub use sync::{Fence, FenceTimeout};
pub use upload::{
    AllocationFailure, RecoveryCache, Snapshot, UploadConfig, UploadError, UploadErrorKind,
    UploadReceipt, UploadSession, UploadStats, UploadStrategy,
};

pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
pub use diagnostics::{GB101, GB102, GB201, GB202, GB203, GB204, GB205, GB301, GB401};

#[cfg(feature = "gpu-vulkan")]
pub use gpu::vulkan::VulkanDevice;
