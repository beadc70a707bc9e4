//! Client-facing GPU buffer object.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::allocation::SharedAllocation;
use super::category::BufferCategory;
use crate::gpu::{BindingTarget, BufferId, GpuDevice};
use crate::upload::{AllocationFailure, UploadError, UploadReceipt, UploadSession};

/// Where a resource stands with the device.
#[derive(Debug, Default)]
pub(crate) enum ResourceState {
    /// No device buffer
    #[default]
    Unallocated,
    /// A device buffer name exists but has no storage yet
    Created(BufferId),
    /// Storage exists, possibly shared with a recovery snapshot
    Ready(Arc<SharedAllocation>),
}

/// A GPU buffer holding vertex, index or texture data.
///
/// The binding target is fixed by the first allocation, and the capacity by
/// the first upload. Dropping the resource releases it.
pub struct BufferResource {
    device: Arc<dyn GpuDevice>,
    pub(crate) state: ResourceState,
    pub(crate) target: BindingTarget,
    pub(crate) dirty: bool,
    pub(crate) last_error: Option<UploadError>,
}

impl BufferResource {
    /// Create an unallocated buffer on `device`.
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self {
            device,
            state: ResourceState::Unallocated,
            target: BindingTarget::ArrayBuffer,
            dirty: true,
            last_error: None,
        }
    }

    /// Create a device buffer for `category` if there is none yet.
    ///
    /// Returns whether the buffer's category is compatible with `category`.
    /// On `false` the reason is kept in [`last_error`](Self::last_error).
    pub fn allocate(&mut self, category: BufferCategory) -> bool {
        match self.try_allocate(category) {
            Ok(()) => true,
            Err(err) => {
                self.last_error = Some(err);
                false
            }
        }
    }

    pub(crate) fn try_allocate(&mut self, category: BufferCategory) -> Result<(), UploadError> {
        let caps = self.device.capabilities();
        if let ResourceState::Unallocated = self.state {
            let handle = self
                .device
                .create_buffer()
                .map_err(AllocationFailure::Device)?;
            self.state = ResourceState::Created(handle);
            self.target = category.resolve(caps);
        }

        if category.is_compatible(self.target, caps) {
            Ok(())
        } else {
            Err(UploadError::IncompatibleCategory {
                requested: category,
                actual: self.category(),
            })
        }
    }

    /// Upload `data`, allocating on first use. See [`UploadSession`].
    pub fn upload(
        &mut self,
        session: &UploadSession,
        data: &[u8],
        category: BufferCategory,
    ) -> Result<UploadReceipt, UploadError> {
        match crate::upload::engine::upload(self, session, data, category) {
            Ok(receipt) => {
                self.last_error = None;
                Ok(receipt)
            }
            Err(err) => {
                session.report_failure(&err);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Attach the buffer at its binding target. `false` if unallocated.
    pub fn bind(&self) -> bool {
        match self.handle() {
            Some(handle) => {
                self.device.bind_buffer(self.target, Some(handle));
                true
            }
            None => false,
        }
    }

    /// Detach the buffer's binding target. `false` if unallocated.
    pub fn unbind(&self) -> bool {
        if self.handle().is_none() {
            return false;
        }
        self.device.bind_buffer(self.target, None);
        true
    }

    /// Drop the device buffer. `false` if there was none.
    ///
    /// Storage still referenced by a recovery snapshot stays alive on the
    /// device until the snapshot is invalidated.
    pub fn release(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            ResourceState::Unallocated => false,
            ResourceState::Created(handle) => {
                self.device.bind_buffer(self.target, None);
                self.device.destroy_buffer(handle);
                true
            }
            ResourceState::Ready(allocation) => {
                self.device.bind_buffer(self.target, None);
                drop(allocation);
                true
            }
        }
    }

    /// Category the buffer serves.
    pub fn category(&self) -> BufferCategory {
        BufferCategory::from_target(self.target)
    }

    /// Binding target.
    pub fn target(&self) -> BindingTarget {
        self.target
    }

    /// Device buffer id, `None` when unallocated.
    pub fn handle(&self) -> Option<BufferId> {
        match &self.state {
            ResourceState::Unallocated => None,
            ResourceState::Created(handle) => Some(*handle),
            ResourceState::Ready(allocation) => Some(allocation.handle()),
        }
    }

    /// Storage size in bytes, zero without storage.
    pub fn capacity(&self) -> usize {
        self.allocation().map_or(0, |a| a.capacity())
    }

    /// Whether a device buffer exists.
    pub fn is_allocated(&self) -> bool {
        self.handle().is_some()
    }

    /// Whether the contents are stale.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag the contents as stale until the next successful upload.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Error from the last failed operation, cleared by a successful upload.
    pub fn last_error(&self) -> Option<&UploadError> {
        self.last_error.as_ref()
    }

    /// Message of the last error.
    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ToString::to_string)
    }

    /// Storage currently held.
    pub fn allocation(&self) -> Option<&Arc<SharedAllocation>> {
        match &self.state {
            ResourceState::Ready(allocation) => Some(allocation),
            _ => None,
        }
    }

    /// Copy back the first `len` bytes of the storage.
    pub fn read_back(&self, len: usize) -> Option<Vec<u8>> {
        self.allocation()?.read_back(len)
    }

    /// Block until the GPU is done with the last upload.
    pub fn wait_idle(&self, timeout: Duration) -> Result<(), UploadError> {
        if let Some(allocation) = self.allocation() {
            allocation
                .lock()
                .fence
                .wait(timeout, Duration::from_micros(100))?;
        }
        Ok(())
    }

    pub(crate) fn device_arc(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }
}

impl fmt::Debug for BufferResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferResource")
            .field("state", &self.state)
            .field("target", &self.target)
            .field("dirty", &self.dirty)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceCapabilities, DummyDevice};
    use crate::upload::UploadErrorKind;

    fn resource() -> (Arc<DummyDevice>, BufferResource) {
        let device = Arc::new(DummyDevice::new());
        let resource = BufferResource::new(device.clone());
        (device, resource)
    }

    #[test]
    fn allocate_is_idempotent() {
        let (_device, mut buffer) = resource();
        assert!(buffer.allocate(BufferCategory::Index));
        let handle = buffer.handle();

        assert!(buffer.allocate(BufferCategory::Index));
        assert_eq!(buffer.handle(), handle);
        assert_eq!(buffer.category(), BufferCategory::Index);
    }

    #[test]
    fn allocate_rejects_other_category() {
        let (_device, mut buffer) = resource();
        assert!(buffer.allocate(BufferCategory::Vertex));
        assert!(!buffer.allocate(BufferCategory::Index));

        assert_eq!(buffer.category(), BufferCategory::Vertex);
        assert_eq!(
            buffer.last_error().map(UploadError::kind),
            Some(UploadErrorKind::IncompatibleCategory)
        );
    }

    #[test]
    fn texture_shares_array_target_without_texture_buffers() {
        let device = Arc::new(DummyDevice::with_capabilities(DeviceCapabilities {
            texture_buffers: false,
            persistent_mapping: true,
        }));
        let mut buffer = BufferResource::new(device);
        assert!(buffer.allocate(BufferCategory::Texture));
        assert!(buffer.allocate(BufferCategory::Vertex));
        assert_eq!(buffer.target(), BindingTarget::ArrayBuffer);
    }

    #[test]
    fn bind_and_unbind_require_allocation() {
        let (device, mut buffer) = resource();
        assert!(!buffer.bind());
        assert!(!buffer.unbind());

        buffer.allocate(BufferCategory::Vertex);
        assert!(buffer.bind());
        assert_eq!(device.bound(BindingTarget::ArrayBuffer), buffer.handle());
        assert!(buffer.unbind());
        assert_eq!(device.bound(BindingTarget::ArrayBuffer), None);
    }

    #[test]
    fn release_is_idempotent() {
        let (device, mut buffer) = resource();
        assert!(!buffer.release());

        buffer.allocate(BufferCategory::Index);
        let handle = buffer.handle().unwrap();
        assert!(buffer.release());
        assert!(!buffer.release());

        assert!(!buffer.is_allocated());
        assert_eq!(buffer.capacity(), 0);
        assert!(!device.is_live(handle));
    }

    #[test]
    fn drop_releases_device_buffer() {
        let (device, mut buffer) = resource();
        buffer.allocate(BufferCategory::Vertex);
        drop(buffer);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn starts_dirty() {
        let (_device, mut buffer) = resource();
        assert!(buffer.is_dirty());
        buffer.dirty = false;
        buffer.mark_dirty();
        assert!(buffer.is_dirty());
    }
}
