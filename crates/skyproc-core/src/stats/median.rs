/// Median of `values`, reordering them in place.
///
/// Uses `select_nth_unstable` for O(n) selection without a full sort.
/// Returns `None` for an empty slice.
pub fn median_of(values: &mut [f32]) -> Option<f32> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(values[0]);
    }

    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if n % 2 == 1 {
        Some(upper)
    } else {
        let lower = *values[..mid]
            .select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b))
            .1;
        Some((lower + upper) / 2.0)
    }
}

/// Linearly interpolated percentile (`pct` in [0, 100]), reordering `values`.
pub fn percentile_of(values: &mut [f32], pct: f32) -> Option<f32> {
    let n = values.len();
    if n == 0 {
        return None;
    }

    let pos = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f32;

    let lo_val = *values.select_nth_unstable_by(lo, |a, b| a.total_cmp(b)).1;
    if hi == lo || frac == 0.0 {
        return Some(lo_val);
    }
    // Everything above `lo` is >= lo_val; the next order statistic is their minimum.
    let hi_val = values[lo + 1..]
        .iter()
        .copied()
        .fold(f32::INFINITY, f32::min);
    Some(lo_val + frac * (hi_val - lo_val))
}
