//! Diagnostics for buffer uploads.
//!
//! Failed uploads and notable fallbacks raise coded diagnostics. They are
//! written through the `log` crate (default feature), or to stderr without
//! it, and are also handed to the session's [`DiagnosticSink`] if one is set.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | GB1xx | Category issues                |
//! | GB2xx | Allocation issues              |
//! | GB3xx | Synchronization issues         |
//! | GB4xx | Recovery issues                |

pub mod emit;
pub mod kind;

pub use emit::{emit, is_suppressed, suppress_diagnostics, trace_transfer, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use kind::{GB101, GB102, GB201, GB202, GB203, GB204, GB205, GB301, GB401};
