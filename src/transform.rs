//! Series transforms applied between parsing and plotting.

use tracing::debug;

use crate::fsysinfo::SampleSet;

/// Difference between consecutive samples; one element shorter than the input.
pub fn diff(series: &[i64]) -> Vec<i64> {
    series
        .windows(2)
        .map(|pair| pair[1].saturating_sub(pair[0]))
        .collect()
}

/// Mean of each consecutive block of `window` samples.
///
/// A trailing block shorter than `window` is averaged over what remains.
pub fn average(series: &[f64], window: usize) -> Vec<f64> {
    series
        .chunks(window.max(1))
        .map(|block| block.iter().sum::<f64>() / block.len() as f64)
        .collect()
}

/// Run the requested transforms over every series, diff first.
pub fn apply(samples: SampleSet, diff_samples: bool, window: usize) -> SampleSet<f64> {
    let samples = if diff_samples {
        debug!(series = samples.len(), "applying first difference");
        samples.map_series(diff)
    } else {
        samples
    };

    let samples = samples.map_series(|s| s.iter().map(|&v| v as f64).collect());
    if window > 1 {
        debug!(series = samples.len(), window, "averaging samples");
        samples.map_series(|s| average(s, window))
    } else {
        samples
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fsysinfo::tokenize;

    #[test]
    fn test_diff_values() {
        let series = [3, 5, 4, 10];
        let d = diff(&series);
        assert_eq!(d, vec![2, -1, 6]);
        for i in 0..d.len() {
            assert_eq!(d[i], series[i + 1] - series[i]);
        }
    }

    #[test]
    fn test_diff_short_series() {
        assert!(diff(&[]).is_empty());
        assert!(diff(&[42]).is_empty());
        assert_eq!(diff(&[1, 2]).len(), 1);
    }

    #[test]
    fn test_diff_saturates_on_overflow() {
        assert_eq!(diff(&[i64::MIN, i64::MAX]), vec![i64::MAX]);
        assert_eq!(diff(&[i64::MAX, i64::MIN]), vec![i64::MIN]);
    }

    #[test]
    fn test_average_trailing_block() {
        assert_eq!(average(&[1.0, 2.0, 3.0, 4.0, 5.0], 2), vec![1.5, 3.5, 5.0]);
    }

    #[test]
    fn test_average_window_one_is_identity() {
        let series = [4.0, -2.0, 7.5];
        assert_eq!(average(&series, 1), series.to_vec());
    }

    #[test]
    fn test_average_length() {
        let series: Vec<f64> = (0..10).map(f64::from).collect();
        for window in 1..=12 {
            assert_eq!(average(&series, window).len(), series.len().div_ceil(window));
        }
        assert!(average(&[], 3).is_empty());
    }

    fn sample_set() -> SampleSet {
        let mut log = String::from("SYSCALL\n  open  1  3  6  10  15\n");
        log.push_str(&"\n".repeat(22));
        tokenize(&log).unwrap()
    }

    #[test]
    fn test_apply_diff_then_average() {
        let out = apply(sample_set(), true, 2);
        // diff: [2, 3, 4, 5] -> blocks [2, 3], [4, 5]
        assert_eq!(out.get("SYSCALL.open"), Some(&[2.5, 4.5][..]));
    }

    #[test]
    fn test_apply_without_transforms() {
        let out = apply(sample_set(), false, 1);
        assert_eq!(out.get("SYSCALL.open"), Some(&[1.0, 3.0, 6.0, 10.0, 15.0][..]));
    }

    #[test]
    fn test_apply_average_only() {
        let out = apply(sample_set(), false, 3);
        assert_eq!(out.get("SYSCALL.open"), Some(&[10.0 / 3.0, 12.5][..]));
    }
}
