//! Data-parallel byte copy into mapped storage.

use std::thread;

/// Copy `src` into the front of `dst`, splitting the work across up to
/// `workers` threads when `src` is at least `threshold` bytes.
///
/// Returns the number of threads that took part.
///
/// # Panics
///
/// Panics if `dst` is shorter than `src`.
pub fn copy_bytes(src: &[u8], dst: &mut [u8], threshold: usize, workers: usize) -> usize {
    let dst = &mut dst[..src.len()];
    if workers <= 1 || src.len() < threshold || src.len() < workers {
        dst.copy_from_slice(src);
        return 1;
    }

    let chunk = (src.len() + workers - 1) / workers;
    let mut pieces = dst.chunks_mut(chunk).zip(src.chunks(chunk));
    let Some((first_dst, first_src)) = pieces.next() else {
        return 1;
    };

    thread::scope(|scope| {
        let mut used = 1;
        for (d, s) in pieces {
            scope.spawn(move || d.copy_from_slice(s));
            used += 1;
        }
        first_dst.copy_from_slice(first_src);
        used
    })
}
