//! GPU buffer resources.

pub(crate) mod allocation;
pub(crate) mod buffer;
mod category;

pub use allocation::{MappedRegion, SharedAllocation};
pub use buffer::BufferResource;
pub use category::BufferCategory;
