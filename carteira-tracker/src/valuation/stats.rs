//! Descriptive statistics over closing prices.
//!
//! Percentiles use linear interpolation between the closest ranks so the
//! bands match what spreadsheet and dataframe tooling report.

/// Arithmetic mean; `None` for an empty slice.
///
/// Accumulates offsets from the minimum, so equal values average to
/// exactly that value.
pub fn mean(values: &[f64]) -> Option<f64> {
    let base = min(values)?;
    let offset = values.iter().map(|v| v - base).sum::<f64>() / values.len() as f64;
    Some(base + offset)
}

/// Mean of the last `n` values (all values when fewer exist).
pub fn tail_mean(values: &[f64], n: usize) -> Option<f64> {
    let start = values.len().saturating_sub(n);
    mean(&values[start..])
}

/// Quantile `q` in [0, 1] with linear interpolation.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (sorted.len() - 1) as f64 * q;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Smallest value; `None` for an empty slice.
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Largest value; `None` for an empty slice.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}
