use crate::dataset::Sample;

use super::buffer::SlidingBuffer;

/// Normalizes a scrub request against the current buffer length.
///
/// Out-of-range indices clamp to the buffer length, and a scrub that lands on the
/// live tail collapses to `None`.
pub fn clamp_scrub(index: Option<usize>, buffer_len: usize) -> Option<usize> {
    index
        .map(|i| i.min(buffer_len))
        .filter(|&i| i < buffer_len)
}

/// The slice the metrics and renderers see: a frozen prefix while scrubbing,
/// otherwise the whole buffer.
pub fn visible_slice(buffer: &SlidingBuffer, scrub_index: Option<usize>) -> Vec<Sample> {
    match scrub_index {
        Some(index) => buffer.prefix(index),
        None => buffer.to_vec(),
    }
}
