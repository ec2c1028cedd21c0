//! Nearest-sample lookup in a time vector.
//!
//! Turns marker timestamps into sample offsets.  No interpolation: the
//! result is always an existing index, clamped to the endpoints for queries
//! outside the recorded range.

/// Index minimising `|times[i] - value|`; the first one on ties.
///
/// Linear scan, so `times` need not be sorted.  `None` only for an empty
/// time vector.
pub fn nearest_index(times: &[f64], value: f64) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &t)| {
            let d = (t - value).abs();
            match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            }
        })
        .map(|(i, _)| i)
}

/// Vectorised [`nearest_index`] for an ascending `times`.
///
/// Each query is located by binary search, then the closer of the left and
/// right neighbours is taken (the right one on an exact tie).  Queries
/// before the first or after the last timestamp resolve to the boundary
/// index.  Empty `times` gives an empty result.
pub fn nearest_index_array(times: &[f64], values: &[f64]) -> Vec<usize> {
    match times.len() {
        0 => return vec![],
        1 => return vec![0; values.len()],
        _ => {}
    }
    let last = times.len() - 1;
    values
        .iter()
        .map(|&v| {
            let insert = times.partition_point(|&t| t < v);
            let right = insert.clamp(1, last);
            let left = right - 1;
            if (v - times[left]).abs() < (v - times[right]).abs() {
                left
            } else {
                right
            }
        })
        .collect()
}
