//! Upload errors.

use std::fmt;
use std::time::Duration;

use crate::gpu::{DeviceError, DeviceErrorCode};
use crate::resource::BufferCategory;
use crate::sync::FenceTimeout;

/// Why a buffer could not get or use its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationFailure {
    /// Uploads must carry at least one byte
    ZeroSize,
    /// The buffer's capacity is fixed at first allocation
    ExceedsCapacity { requested: usize, capacity: usize },
    /// A device call returned an error
    Device(DeviceError),
    /// The device queued errors while the storage was being set up
    DeviceErrors(Vec<DeviceErrorCode>),
    /// The storage could not be mapped for writing
    MapFailed,
}

impl fmt::Display for AllocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationFailure::ZeroSize => write!(f, "cannot allocate an empty buffer"),
            AllocationFailure::ExceedsCapacity { requested, capacity } => write!(
                f,
                "upload of {} bytes exceeds buffer capacity of {} bytes",
                requested, capacity
            ),
            AllocationFailure::Device(err) => write!(f, "{}", err),
            AllocationFailure::DeviceErrors(codes) => {
                write!(f, "device reported errors:")?;
                for code in codes {
                    write!(f, " {};", code)?;
                }
                Ok(())
            }
            AllocationFailure::MapFailed => write!(f, "failed to map buffer storage"),
        }
    }
}

/// Errors that can occur during an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// The buffer is fixed to another category
    IncompatibleCategory {
        requested: BufferCategory,
        actual: BufferCategory,
    },
    /// Storage could not be created, mapped or reused
    AllocationFailure(AllocationFailure),
    /// The GPU did not release the buffer in time
    SynchronizationTimeout { waited: Duration },
}

/// Flat error kind for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadErrorKind {
    IncompatibleCategory,
    AllocationFailure,
    SynchronizationTimeout,
}

impl UploadError {
    /// The error's kind.
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::IncompatibleCategory { .. } => UploadErrorKind::IncompatibleCategory,
            UploadError::AllocationFailure(_) => UploadErrorKind::AllocationFailure,
            UploadError::SynchronizationTimeout { .. } => UploadErrorKind::SynchronizationTimeout,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::IncompatibleCategory { requested, actual } => write!(
                f,
                "Trying to upload {} data to incompatible {} buffer",
                requested, actual
            ),
            UploadError::AllocationFailure(failure) => {
                write!(f, "GPU buffer allocation failed: {}", failure)
            }
            UploadError::SynchronizationTimeout { waited } => write!(
                f,
                "GPU did not release the buffer within {:?}; device may be hung",
                waited
            ),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::AllocationFailure(AllocationFailure::Device(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocationFailure> for UploadError {
    fn from(failure: AllocationFailure) -> Self {
        UploadError::AllocationFailure(failure)
    }
}

impl From<FenceTimeout> for UploadError {
    fn from(timeout: FenceTimeout) -> Self {
        UploadError::SynchronizationTimeout {
            waited: timeout.waited,
        }
    }
}
