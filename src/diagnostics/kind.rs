//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about another diagnostic.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `GB1xx` - Category issues
/// - `GB2xx` - Allocation issues
/// - `GB3xx` - Synchronization issues
/// - `GB4xx` - Recovery issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "GB101").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (GB1xx - Categories)
// =============================================================================

/// GB101: Upload into a buffer of another category.
pub const GB101: Diagnostic = Diagnostic::error(
    "GB101",
    "upload targets a buffer fixed to another category"
).with_note("a buffer's binding target is fixed by its first allocation")
 .with_help("use a separate buffer for each category");

/// GB102: Texture data bound at the array target.
pub const GB102: Diagnostic = Diagnostic::warning(
    "GB102",
    "device has no texture buffers, texture data uses the array target"
).with_note("texture and vertex buffers become interchangeable on this device");

// =============================================================================
// Predefined diagnostics (GB2xx - Allocation)
// =============================================================================

/// GB201: Storage allocation failed.
pub const GB201: Diagnostic = Diagnostic::error(
    "GB201",
    "GPU buffer allocation failed"
).with_note("the buffer was released and is unusable for this submission")
 .with_help("skip or retry the draw that depends on this buffer");

/// GB202: Device errors drained while allocating.
pub const GB202: Diagnostic = Diagnostic::error(
    "GB202",
    "device reported errors while allocating buffer storage"
).with_note("the allocation was aborted instead of continuing with possibly invalid state");

/// GB203: Upload larger than the buffer.
pub const GB203: Diagnostic = Diagnostic::error(
    "GB203",
    "upload exceeds buffer capacity"
).with_note("capacity is fixed at first allocation and buffers do not grow")
 .with_help("release the buffer and upload again to allocate a larger one");

/// GB204: Persistent mapping unavailable.
pub const GB204: Diagnostic = Diagnostic::warning(
    "GB204",
    "device lacks persistent mapping, falling back to map-per-call uploads"
);

/// GB205: Stale device errors discarded.
pub const GB205: Diagnostic = Diagnostic::warning(
    "GB205",
    "discarded device errors queued before this allocation"
).with_note("these errors were raised by earlier, unrelated device calls");

// =============================================================================
// Predefined diagnostics (GB3xx - Synchronization)
// =============================================================================

/// GB301: Fence wait timed out.
pub const GB301: Diagnostic = Diagnostic::error(
    "GB301",
    "timed out waiting for the GPU to release a buffer"
).with_note("the device may be hung, or the fence was never submitted")
 .with_help("raise fence_timeout in UploadConfig if the GPU is just slow");

// =============================================================================
// Predefined diagnostics (GB4xx - Recovery)
// =============================================================================

/// GB401: Recovered storage too small.
pub const GB401: Diagnostic = Diagnostic::warning(
    "GB401",
    "recovered storage is smaller than the upload, allocating fresh storage"
).with_note("the snapshot at this slot stays in the cache");
