//! Build script for gpubuf.
//!
//! Prints notes about the enabled features so integrators see which backend
//! and output path they are building with.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_GPU_VULKAN");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let vulkan_enabled = env::var("CARGO_FEATURE_GPU_VULKAN").is_ok();
    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific notes
    // =========================================================================

    if vulkan_enabled {
        emit_info("Vulkan backend enabled");
        emit_note("Wrap your device with gpubuf::VulkanDevice::new(...)");
        emit_note("Buffers live in host-visible coherent memory via gpu-allocator");
    }

    if parking_lot_enabled {
        emit_info("Using parking_lot for mutexes");
    }

    if !log_enabled {
        if diagnostics_enabled || !is_release {
            emit_note("'log' feature disabled: diagnostics go to stderr");
        } else {
            emit_warning("'log' and 'diagnostics' both disabled: upload diagnostics are dropped");
            emit_note("Failures are still returned as UploadError values");
        }
    }

    if is_release && !parking_lot_enabled {
        emit_note("Tip: enable 'parking_lot' for cheaper per-buffer locks:");
        emit_note("  gpubuf = { version = \"0.1\", features = [\"parking_lot\"] }");
    }

    check_target();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[gpubuf] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[gpubuf]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[gpubuf] warning: {}", msg);
}

// =============================================================================
// Environment checks
// =============================================================================

fn check_target() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("Fence waits block the calling thread; use copy_workers = 1");
    }
}
