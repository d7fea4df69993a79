//! Percentiles by linear interpolation between order statistics
//!
//! For `n` sorted samples and percentile `p` (0..=100) the fractional rank is
//! `r = p / 100 * (n - 1)`. With `lo = floor(r)` and `hi = ceil(r)` the result
//! is `x[lo] + (x[hi] - x[lo]) * (r - lo)`. This is the "linear" method most
//! numeric libraries default to. The arithmetic is fixed so the same samples
//! always give the same bits.

/// Percentile of unsorted samples; `None` when there are none
#[must_use]
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// Percentile of samples already sorted ascending
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let p = p.clamp(0.0, 100.0);

    let rank = p / 100.0 * last as f64;
    let lo = rank.floor() as usize;
    let hi = (rank.ceil() as usize).min(last);
    let fraction = rank - lo as f64;

    let low = sorted[lo];
    let high = sorted[hi];
    Some(low + (high - low) * fraction)
}

/// Arithmetic mean; `None` when there are no samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(percentile(&[], 95.0), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_single_sample() {
        assert_eq!(percentile(&[42.0], 95.0), Some(42.0));
        assert_eq!(percentile(&[42.0], 0.0), Some(42.0));
    }

    #[test]
    fn test_linear_interpolation() {
        // rank = 0.95 * 4 = 3.8 -> 40 + (50 - 40) * 0.8
        let p95 = percentile(&[50.0, 10.0, 30.0, 20.0, 40.0], 95.0).unwrap();
        assert!((p95 - 48.0).abs() < 1e-9);

        let p50 = percentile(&[10.0, 20.0, 30.0, 40.0], 50.0).unwrap();
        assert!((p50 - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds() {
        let samples = [3.0, 9.0, 1.0, 7.0];
        assert_eq!(percentile(&samples, 0.0), Some(1.0));
        assert_eq!(percentile(&samples, 100.0), Some(9.0));
        assert_eq!(percentile(&samples, 250.0), Some(9.0));
    }

    #[test]
    fn test_within_min_max() {
        let samples: Vec<f64> = (0..97).map(|i| f64::from((i * 37) % 101)).collect();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for p in [0.0, 1.0, 25.0, 50.0, 95.0, 99.0, 100.0] {
            let value = percentile(&samples, p).unwrap();
            assert!(value >= min && value <= max, "p{p} = {value}");
        }
    }

    #[test]
    fn test_reproducible() {
        let samples = [0.1, 0.7, 0.3, 1e9, 5.5];
        let a = percentile(&samples, 95.0).unwrap();
        let b = percentile(&samples, 95.0).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_mean() {
        assert!((mean(&[1.0, 2.0, 3.0]).unwrap() - 2.0).abs() < f64::EPSILON);
    }
}
