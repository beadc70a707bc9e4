//! Buffer categories and their binding targets.

use std::fmt;

use crate::gpu::{BindingTarget, DeviceCapabilities};

/// Logical role of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferCategory {
    /// Vertex attributes
    Vertex,
    /// Indices
    Index,
    /// Texel data read through a buffer texture
    Texture,
}

impl BufferCategory {
    /// Binding target this category uses on a device with `caps`.
    ///
    /// Devices without texture buffers bind texture data at the array target.
    pub fn resolve(self, caps: DeviceCapabilities) -> BindingTarget {
        match self {
            BufferCategory::Vertex => BindingTarget::ArrayBuffer,
            BufferCategory::Index => BindingTarget::ElementArrayBuffer,
            BufferCategory::Texture if caps.texture_buffers => BindingTarget::TextureBuffer,
            BufferCategory::Texture => BindingTarget::ArrayBuffer,
        }
    }

    /// Category a buffer bound at `target` serves.
    pub fn from_target(target: BindingTarget) -> Self {
        match target {
            BindingTarget::ArrayBuffer => BufferCategory::Vertex,
            BindingTarget::ElementArrayBuffer => BufferCategory::Index,
            BindingTarget::TextureBuffer => BufferCategory::Texture,
        }
    }

    /// Whether a buffer fixed at `target` can take data of this category.
    pub fn is_compatible(self, target: BindingTarget, caps: DeviceCapabilities) -> bool {
        self.resolve(caps) == target
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            BufferCategory::Vertex => "vertex",
            BufferCategory::Index => "index",
            BufferCategory::Texture => "texture",
        }
    }
}

impl fmt::Display for BufferCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
