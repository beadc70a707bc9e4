//! Buffer uploads.
//!
//! - [`UploadSession`]: sequence counter, recovery cache, config and stats
//! - [`UploadConfig`] / [`UploadStrategy`]: how bytes reach the device
//! - [`RecoveryCache`]: storage snapshots addressed by upload slot
//! - [`UploadError`]: what can go wrong

pub mod config;
pub mod copy;
pub(crate) mod engine;
pub mod error;
pub mod recovery;
pub mod session;
pub mod stats;

pub use config::{UploadConfig, UploadStrategy};
pub use engine::UploadReceipt;
pub use error::{AllocationFailure, UploadError, UploadErrorKind};
pub use recovery::{RecoveryCache, Snapshot};
pub use session::UploadSession;
pub use stats::UploadStats;
