//! Order statistics over small samples of peer sales.
//!
//! Percentiles use linear interpolation between closest ranks, so
//! p0 is the minimum and p100 the maximum of the sample.

/// Sorted copy of `values`, dropping non-finite entries.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile `p` (0–100) of an already sorted sample.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    percentile_sorted(sorted, 50.0)
}

/// Trim to the `[lower, upper]` percentile band, take the median of what
/// remains, then cap at the `cap` percentile of the untrimmed sample.
///
/// When the band excludes every value (two-point samples can do this),
/// the median of the untrimmed sample is used instead.
pub fn trimmed_capped_median(values: &[f64], lower: f64, upper: f64, cap: f64) -> Option<f64> {
    let sorted = sorted_finite(values);
    let lo = percentile_sorted(&sorted, lower)?;
    let hi = percentile_sorted(&sorted, upper)?;
    let cap_value = percentile_sorted(&sorted, cap)?;

    let trimmed: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| *v >= lo && *v <= hi)
        .collect();

    let centre = if trimmed.is_empty() {
        median_sorted(&sorted)?
    } else {
        median_sorted(&trimmed)?
    };
    Some(centre.min(cap_value))
}

/// Round to `decimals` places, half away from zero.
///
/// Returns `value` unchanged when the scaled value would overflow, so
/// the result is never NaN for a finite input.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_between_ranks() {
        let s = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_sorted(&s, 0.0), Some(10.0));
        assert_eq!(percentile_sorted(&s, 100.0), Some(50.0));
        assert_eq!(percentile_sorted(&s, 50.0), Some(30.0));
        let p10 = percentile_sorted(&s, 10.0).unwrap();
        assert!((p10 - 14.0).abs() < 1e-9, "p10 = {p10}");
    }

    #[test]
    fn empty_sample_has_no_percentile() {
        assert_eq!(percentile_sorted(&[], 50.0), None);
        assert_eq!(trimmed_capped_median(&[], 10.0, 90.0, 80.0), None);
    }

    #[test]
    fn flagship_outlier_does_not_drag_estimate_up() {
        let sales = [100.0, 110.0, 90.0, 105.0, 95.0, 100.0, 98.0, 102.0, 5000.0];
        let est = trimmed_capped_median(&sales, 10.0, 90.0, 80.0).unwrap();
        let mean = sales.iter().sum::<f64>() / sales.len() as f64;
        assert!(est < 120.0, "estimate {est} should ignore the outlier");
        assert!(mean > 600.0);
    }

    #[test]
    fn cap_applies_when_median_exceeds_cap_percentile() {
        // Untrimmed median is 30; p25 is 20.
        let sales = [10.0, 20.0, 30.0, 40.0, 50.0];
        let est = trimmed_capped_median(&sales, 0.0, 100.0, 25.0).unwrap();
        assert_eq!(est, 20.0);
    }

    #[test]
    fn two_point_sample_falls_back_to_untrimmed_median() {
        let est = trimmed_capped_median(&[1.0, 100.0], 10.0, 90.0, 80.0).unwrap();
        assert!((est - 50.5).abs() < 1e-9, "est = {est}");
    }

    #[test]
    fn single_value_sample_is_that_value() {
        assert_eq!(trimmed_capped_median(&[42.0], 10.0, 90.0, 80.0), Some(42.0));
    }

    #[test]
    fn rounding_to_cents() {
        assert_eq!(round_to(99.996, 2), 100.0);
        assert_eq!(round_to(99.4, 2), 99.4);
        assert_eq!(round_to(99.4, 0), 99.0);
    }

    #[test]
    fn oversized_precision_leaves_value_unrounded() {
        assert_eq!(round_to(5.0, 400), 5.0);
        assert_eq!(round_to(5.0, u32::MAX), 5.0);
        assert!(!round_to(99.996, 308).is_nan());
    }
}
