//! GPU device traits and types
//!
//! This module defines the device interface WITHOUT pulling in any backend-specific dependencies.
//! Buffer resources and the upload engine depend on these traits, not on implementations.

use std::fmt;
use std::num::NonZeroU64;
use std::ptr::NonNull;

/// Opaque device buffer id.
///
/// Device ids are never zero; an unallocated buffer is represented as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(NonZeroU64);

impl BufferId {
    /// Wrap a raw device id. Returns `None` for the reserved id `0`.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw device id.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

/// Opaque device fence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceId(NonZeroU64);

impl FenceId {
    /// Wrap a raw fence id. Returns `None` for `0`.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw device id.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Device binding point a buffer attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    /// Vertex attribute data
    ArrayBuffer,
    /// Index data
    ElementArrayBuffer,
    /// Texel data sampled through a buffer texture
    TextureBuffer,
}

impl BindingTarget {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BindingTarget::ArrayBuffer => "array",
            BindingTarget::ElementArrayBuffer => "element-array",
            BindingTarget::TextureBuffer => "texture",
        }
    }
}

/// What the device can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Device has a dedicated texture-buffer binding point
    pub texture_buffers: bool,
    /// Device supports persistent, coherent write mappings
    pub persistent_mapping: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            texture_buffers: true,
            persistent_mapping: true,
        }
    }
}

/// Storage request flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageFlags {
    pub bits: u32,
}

impl StorageFlags {
    pub const NONE: Self = Self { bits: 0 };
    pub const MAP_READ: Self = Self { bits: 0x0001 };
    pub const MAP_WRITE: Self = Self { bits: 0x0002 };
    pub const MAP_PERSISTENT: Self = Self { bits: 0x0040 };
    pub const MAP_COHERENT: Self = Self { bits: 0x0080 };
    pub const DYNAMIC_STORAGE: Self = Self { bits: 0x0100 };

    /// Flags for a persistent, coherent, write-mappable allocation.
    pub const PERSISTENT_WRITE: Self = Self {
        bits: Self::MAP_WRITE.bits | Self::MAP_PERSISTENT.bits | Self::MAP_COHERENT.bits,
    };

    /// Flags for re-specifiable storage mapped per upload.
    pub const DYNAMIC_WRITE: Self = Self {
        bits: Self::MAP_READ.bits | Self::MAP_WRITE.bits | Self::DYNAMIC_STORAGE.bits,
    };

    /// Check whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl std::ops::BitOr for StorageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

/// Access flags for a mapping request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapAccess {
    pub bits: u32,
}

impl MapAccess {
    pub const READ: Self = Self { bits: 0x0001 };
    pub const WRITE: Self = Self { bits: 0x0002 };
    pub const INVALIDATE_RANGE: Self = Self { bits: 0x0004 };
    pub const UNSYNCHRONIZED: Self = Self { bits: 0x0020 };
    pub const PERSISTENT: Self = Self { bits: 0x0040 };
    pub const COHERENT: Self = Self { bits: 0x0080 };

    /// Check whether all bits of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl std::ops::BitOr for MapAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

/// Result of polling a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// All work submitted before the fence has completed
    Signaled,
    /// The GPU is still working
    Pending,
}

/// Device-level error codes drained from the device's error queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    StackOverflow,
    StackUnderflow,
    OutOfMemory,
    TableTooLarge,
    InvalidFramebufferOperation,
    /// Backend-specific code without a portable equivalent
    Unknown(u32),
}

impl DeviceErrorCode {
    /// Readable name of the error class.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceErrorCode::InvalidEnum => "invalid enum",
            DeviceErrorCode::InvalidValue => "invalid value",
            DeviceErrorCode::InvalidOperation => "invalid operation",
            DeviceErrorCode::StackOverflow => "stack overflow",
            DeviceErrorCode::StackUnderflow => "stack underflow",
            DeviceErrorCode::OutOfMemory => "out of memory",
            DeviceErrorCode::TableTooLarge => "table too large",
            DeviceErrorCode::InvalidFramebufferOperation => "invalid framebuffer operation",
            DeviceErrorCode::Unknown(_) => "unknown error",
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceErrorCode::Unknown(code) => write!(f, "unknown error (0x{:04x})", code),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors returned directly by device calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Out of device memory
    OutOfMemory,
    /// Invalid storage size
    InvalidSize,
    /// The id does not name a live buffer
    UnknownBuffer(BufferId),
    /// The request is not valid in the buffer's current state
    InvalidOperation(&'static str),
    /// Backend-specific error (opaque)
    BackendError(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OutOfMemory => write!(f, "GPU out of memory"),
            DeviceError::InvalidSize => write!(f, "Invalid buffer size"),
            DeviceError::UnknownBuffer(id) => write!(f, "Unknown buffer {}", id),
            DeviceError::InvalidOperation(what) => write!(f, "Invalid operation: {}", what),
            DeviceError::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Device/context primitives consumed by buffer resources.
///
/// This trait is object-safe for use with `Arc<dyn GpuDevice>`. All methods take
/// `&self`; implementations serialize access to their own state.
pub trait GpuDevice: Send + Sync {
    /// Capabilities used to resolve categories and upload strategies.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a buffer name without storage.
    fn create_buffer(&self) -> Result<BufferId, DeviceError>;

    /// Destroy a buffer and its storage. Unknown ids are ignored.
    fn destroy_buffer(&self, id: BufferId);

    /// Attach `id` at `target`, or detach whatever is bound there when `None`.
    fn bind_buffer(&self, target: BindingTarget, id: Option<BufferId>);

    /// Specify storage of `size` bytes for a buffer.
    ///
    /// Re-specifying storage of a dynamic buffer orphans its previous contents.
    fn allocate_storage(
        &self,
        id: BufferId,
        target: BindingTarget,
        size: usize,
        flags: StorageFlags,
    ) -> Result<(), DeviceError>;

    /// Map `len` bytes starting at `offset`. Returns `None` if mapping fails.
    ///
    /// The pointer stays valid until `unmap` or `destroy_buffer`.
    fn map_range(
        &self,
        id: BufferId,
        target: BindingTarget,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Option<NonNull<u8>>;

    /// Release a mapping made by `map_range`.
    fn unmap(&self, id: BufferId, target: BindingTarget);

    /// Insert a fence after all work submitted so far.
    fn insert_fence(&self) -> Result<FenceId, DeviceError>;

    /// Poll a fence without blocking.
    fn fence_status(&self, fence: FenceId) -> FenceStatus;

    /// Delete a fence. Unknown ids are ignored.
    fn delete_fence(&self, fence: FenceId);

    /// Take every error queued on the device since the last drain.
    fn drain_errors(&self) -> Vec<DeviceErrorCode>;
}
