//! Diagnostic emission backend.
//!
//! Handles outputting diagnostics to the log crate, stderr, or custom sinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::kind::{Diagnostic, DiagnosticKind};
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Suppress all diagnostic output.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic with additional runtime context.
///
/// With the `log` feature this goes through the log crate. Without it,
/// diagnostics are written to stderr in debug builds or with the
/// `diagnostics` feature, and dropped otherwise.
pub fn emit(diag: &Diagnostic, context: &str) {
    if is_suppressed() {
        return;
    }

    #[cfg(feature = "log")]
    emit_to_log(diag, context);

    #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
    emit_to_stderr(diag, context);

    #[cfg(all(not(feature = "log"), not(any(debug_assertions, feature = "diagnostics"))))]
    let _ = (diag, context);
}

/// Report how long an upload took and its throughput.
pub fn trace_transfer(bytes: usize, elapsed: Duration) {
    #[cfg(feature = "log")]
    {
        let size = crate::util::size::format_bytes(bytes);
        match crate::upload::stats::transfer_rate_gbps(bytes as u64, elapsed) {
            Some(rate) => log::debug!("[gpubuf] uploaded {} in {:?} ({:.2} GB/s)", size, elapsed, rate),
            None => log::debug!("[gpubuf] uploaded {} in {:?}", size, elapsed),
        }
    }

    #[cfg(not(feature = "log"))]
    let _ = (bytes, elapsed);
}

/// Emit a diagnostic using the log crate.
#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: &str) {
    match diag.kind {
        DiagnosticKind::Error => {
            log::error!("[{}] {}: {}", diag.code, diag.message, context);
        }
        DiagnosticKind::Warning => {
            log::warn!("[{}] {}: {}", diag.code, diag.message, context);
        }
        DiagnosticKind::Note => {
            log::info!("[{}] {}: {}", diag.code, diag.message, context);
        }
    }

    if let Some(note) = diag.note {
        log::debug!("  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::debug!("  help: {}", help);
    }
}

/// Internal: emit to stderr with context.
#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: &str) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Main diagnostic line
    let _ = writeln!(
        stderr,
        "[gpubuf][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );

    // Context
    let _ = writeln!(stderr, "  context: {}", context);

    if let Some(note) = diag.note {
        let _ = writeln!(stderr, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }

    let _ = writeln!(stderr);
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic and the runtime context it was raised with.
    fn emit(&self, diag: &Diagnostic, context: &str);
}

/// A simple sink that collects diagnostics.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<(Diagnostic, String)>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().iter().map(|(d, _)| d.clone()).collect()
    }

    /// Codes of the collected diagnostics, in order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.diagnostics.lock().iter().map(|(d, _)| d.code).collect()
    }

    /// Context strings of the collected diagnostics, in order.
    pub fn contexts(&self) -> Vec<String> {
        self.diagnostics.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|(d, _)| d.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic, context: &str) {
        self.diagnostics.lock().push((diag.clone(), context.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::kind::{GB201, GB204};

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.emit(&GB204, "device: dummy");
        assert!(!sink.has_errors());

        sink.emit(&GB201, "buffer#3");
        assert_eq!(sink.codes(), vec!["GB204", "GB201"]);
        assert_eq!(sink.contexts()[1], "buffer#3");
        assert!(sink.has_errors());

        sink.clear();
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn test_suppression() {
        suppress_diagnostics(true);
        assert!(is_suppressed());
        emit(&GB201, "suppressed");
        suppress_diagnostics(false);
        assert!(!is_suppressed());
    }
}
