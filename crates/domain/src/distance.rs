//! Tolerance helpers shared by the matching strategies.
//!
//! Everything here is a pure function over plain numbers; the matchers decide
//! what counts as close enough.

/// Minimal distance between two steps on a ring of `cycle_len` steps.
///
/// `cycle_len` must be non-zero; step patterns are validated before they reach
/// this point.
pub fn ring_distance(a: usize, b: usize, cycle_len: usize) -> usize {
    let d = a.abs_diff(b) % cycle_len;
    d.min(cycle_len - d)
}

pub fn time_difference(a: f64, b: f64) -> f64 {
    (a - b).abs()
}

/// Successive differences of `sequence`. Empty when fewer than two values.
pub fn interval_vector(sequence: &[f64]) -> Vec<f64> {
    sequence.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Interval vector of `sequence`, padded with zero gaps up to `len` entries.
///
/// A short performance therefore always carries mismatching trailing
/// intervals. Longer vectors are returned untouched.
pub fn padded_intervals(sequence: &[f64], len: usize) -> Vec<f64> {
    let mut intervals = interval_vector(sequence);
    if intervals.len() < len {
        intervals.resize(len, 0.0);
    }
    intervals
}

/// Elementwise `|a_i - b_i|` over the common prefix.
pub fn abs_differences(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| time_difference(*x, *y))
        .collect()
}
