//! Byte size helpers for configuration defaults and log output.

/// `n` kibibytes in bytes.
pub const fn kb(n: usize) -> usize {
    n << 10
}

/// `n` mebibytes in bytes.
pub const fn mb(n: usize) -> usize {
    n << 20
}

/// Render a byte count with the largest unit that keeps it at or above one.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < kb(1) {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
