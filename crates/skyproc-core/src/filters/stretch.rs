use ndarray::Array2;

use crate::stats::percentile_of;

/// Black and white points of a linear stretch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StretchLimits {
    pub low: f32,
    pub high: f32,
}

/// Linear stretch mapping the `low_pct` and `high_pct` percentiles of the
/// finite pixels to 0.0 and 1.0, clamping outside.
///
/// Pixels set in `exclude` do not contribute to the percentiles. Returns the
/// stretched image together with the limits used.
pub fn percentile_stretch(
    data: &Array2<f32>,
    exclude: Option<&Array2<bool>>,
    low_pct: f32,
    high_pct: f32,
) -> (Array2<f32>, StretchLimits) {
    let mut values: Vec<f32> = match exclude {
        Some(mask) => data
            .iter()
            .zip(mask.iter())
            .filter(|(v, &m)| !m && v.is_finite())
            .map(|(&v, _)| v)
            .collect(),
        None => data.iter().copied().filter(|v| v.is_finite()).collect(),
    };

    let low = percentile_of(&mut values, low_pct).unwrap_or(0.0);
    let high = percentile_of(&mut values, high_pct).unwrap_or(1.0);
    let range = if (high - low).abs() < f32::EPSILON {
        1.0
    } else {
        high - low
    };

    let stretched = data.mapv(|v| {
        if v.is_finite() {
            ((v - low) / range).clamp(0.0, 1.0)
        } else {
            0.0
        }
    });
    (stretched, StretchLimits { low, high })
}
