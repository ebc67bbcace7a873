//! Maximum sustained time-weighted average
//!
//! The signal is treated as piecewise constant: each sample's value holds from
//! its timestamp until the next sample, and the final value holds indefinitely.
//! Every sample timestamp is a candidate window start; the window integral is
//! divided by the window length, so unevenly spaced samples are weighted by the
//! time they actually cover.

use crate::models::Sample;

/// Default window for the lap heart-rate metric (30 seconds)
pub const DEFAULT_ROLLING_WINDOW_MS: i64 = 30_000;

/// Rolling maximum-average calculator for a fixed window length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingMaxAverage {
    window_ms: i64,
}

impl RollingMaxAverage {
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// See [`max_window_average`]
    pub fn compute(&self, samples: &[Sample]) -> Option<f64> {
        max_window_average(samples, self.window_ms)
    }
}

impl Default for RollingMaxAverage {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLING_WINDOW_MS)
    }
}

/// Highest time-weighted average over any window of `window_ms` that starts at
/// a sample timestamp.
///
/// `samples` must be ordered by timestamp. Returns `None` for fewer than two
/// samples or a non-positive window. Windows running past the last sample
/// extend its value, so a lap shorter than the window still yields the average
/// over the full window.
///
/// Runs in O(n): window ends advance monotonically, so a single pointer tracks
/// the segment containing each window end.
pub fn max_window_average(samples: &[Sample], window_ms: i64) -> Option<f64> {
    if samples.len() < 2 || window_ms <= 0 {
        return None;
    }

    let n = samples.len();

    // prefix[k] = integral of the held signal over [ts_0, ts_k], in value·ms
    let mut prefix = Vec::with_capacity(n);
    prefix.push(0.0_f64);
    for pair in samples.windows(2) {
        let dt = (pair[1].timestamp - pair[0].timestamp).max(0) as f64;
        let last = prefix[prefix.len() - 1];
        prefix.push(last + pair[0].value * dt);
    }

    let window = window_ms as f64;
    let mut k = 0usize;
    let mut best = f64::NEG_INFINITY;

    for i in 0..n {
        let start = samples[i].timestamp;
        let end = start + window_ms;

        if k < i {
            k = i;
        }
        while k + 1 < n && samples[k + 1].timestamp <= end {
            k += 1;
        }

        let tail = (end - samples[k].timestamp) as f64 * samples[k].value;
        let area = prefix[k] - prefix[i] + tail;
        let avg = area / window;

        if avg > best {
            best = avg;
        }
    }

    best.is_finite().then_some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleSource;
    use proptest::prelude::*;

    fn series(points: &[(i64, f64)]) -> Vec<Sample> {
        points
            .iter()
            .map(|&(ts, v)| Sample::new(ts, v, SampleSource::Device))
            .collect()
    }

    /// Direct integration per window start, used as a reference
    fn reference_max(samples: &[Sample], window_ms: i64) -> Option<f64> {
        if samples.len() < 2 || window_ms <= 0 {
            return None;
        }
        let mut best = f64::NEG_INFINITY;
        for i in 0..samples.len() {
            let start = samples[i].timestamp;
            let end = start + window_ms;
            let mut area = 0.0;
            for j in i..samples.len() {
                let seg_start = samples[j].timestamp.max(start);
                let seg_end = if j + 1 < samples.len() {
                    samples[j + 1].timestamp.min(end)
                } else {
                    end
                };
                if seg_end > seg_start {
                    area += samples[j].value * (seg_end - seg_start) as f64;
                }
                if seg_end >= end {
                    break;
                }
            }
            best = best.max(area / window_ms as f64);
        }
        Some(best)
    }

    #[test]
    fn test_insufficient_samples() {
        assert_eq!(max_window_average(&[], 30_000), None);
        assert_eq!(max_window_average(&series(&[(0, 150.0)]), 30_000), None);
        assert_eq!(max_window_average(&series(&[(0, 150.0), (1000, 150.0)]), 0), None);
    }

    #[test]
    fn test_constant_series_returns_constant() {
        let samples = series(&[(0, 142.0), (130, 142.0), (1900, 142.0), (2000, 142.0), (31_000, 142.0)]);
        let avg = max_window_average(&samples, 30_000).unwrap();
        assert!((avg - 142.0).abs() < 1e-9);
    }

    #[test]
    fn test_uneven_spacing_is_time_weighted() {
        // 100 bpm held for 29.9 s, a 200 bpm spike held only 100 ms, then 100 again
        let samples = series(&[(0, 100.0), (29_900, 200.0), (30_000, 100.0), (60_000, 100.0)]);
        let avg = max_window_average(&samples, 30_000).unwrap();
        // Best window holds the spike for 100 ms and 100 bpm for the rest
        let expected = (200.0 * 100.0 + 100.0 * 29_900.0) / 30_000.0;
        assert!((avg - expected).abs() < 1e-9);
        assert!(avg < 101.0);
    }

    #[test]
    fn test_short_lap_extends_last_value() {
        // Only 10 s observed; window of 30 s holds the last value for the remaining 20 s
        let samples = series(&[(0, 120.0), (10_000, 180.0)]);
        let avg = max_window_average(&samples, 30_000).unwrap();
        assert!((avg - 180.0).abs() < 1e-9);

        let samples = series(&[(0, 180.0), (10_000, 120.0)]);
        let avg = max_window_average(&samples, 30_000).unwrap();
        let expected = (180.0 * 10_000.0 + 120.0 * 20_000.0) / 30_000.0;
        assert!((avg - expected).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_timestamps() {
        let samples = series(&[(0, 100.0), (0, 160.0), (15_000, 160.0), (30_000, 100.0)]);
        let avg = max_window_average(&samples, 30_000).unwrap();
        assert!((avg - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_struct_uses_configured_window() {
        let samples = series(&[(0, 100.0), (10_000, 200.0), (20_000, 100.0)]);
        let short = RollingMaxAverage::new(10_000).compute(&samples).unwrap();
        let long = RollingMaxAverage::default().compute(&samples).unwrap();
        assert!((short - 200.0).abs() < 1e-9);
        assert!(long < short);
    }

    fn arb_series() -> impl Strategy<Value = Vec<Sample>> {
        prop::collection::vec((1i64..5_000, 40.0f64..220.0), 2..80).prop_map(|steps| {
            let mut ts = 0i64;
            steps
                .into_iter()
                .map(|(gap, v)| {
                    ts += gap;
                    Sample::new(ts, v, SampleSource::Device)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_matches_reference(samples in arb_series(), window in 1_000i64..60_000) {
            let fast = max_window_average(&samples, window).unwrap();
            let slow = reference_max(&samples, window).unwrap();
            prop_assert!((fast - slow).abs() < 1e-6);
        }

        #[test]
        fn test_constant_any_spacing(
            gaps in prop::collection::vec(1i64..10_000, 1..50),
            value in 30.0f64..230.0,
            window in 500i64..120_000,
        ) {
            let mut ts = 0i64;
            let mut samples = vec![Sample::new(0, value, SampleSource::Device)];
            for gap in gaps {
                ts += gap;
                samples.push(Sample::new(ts, value, SampleSource::Device));
            }
            let avg = max_window_average(&samples, window).unwrap();
            prop_assert!((avg - value).abs() < 1e-6);
        }

        #[test]
        fn test_appending_new_maximum_never_lowers(samples in arb_series(), gap in 1i64..10_000) {
            let before = max_window_average(&samples, 30_000).unwrap();
            let peak = samples.iter().map(|s| s.value).fold(f64::MIN, f64::max);
            let last_ts = samples[samples.len() - 1].timestamp;
            let mut extended = samples.clone();
            extended.push(Sample::new(last_ts + gap, peak + 10.0, SampleSource::Device));
            let after = max_window_average(&extended, 30_000).unwrap();
            prop_assert!(after + 1e-9 >= before);
        }

        #[test]
        fn test_bounded_by_extremes(samples in arb_series()) {
            let avg = max_window_average(&samples, 30_000).unwrap();
            let lo = samples.iter().map(|s| s.value).fold(f64::MAX, f64::min);
            let hi = samples.iter().map(|s| s.value).fold(f64::MIN, f64::max);
            prop_assert!(avg >= lo - 1e-9 && avg <= hi + 1e-9);
        }
    }
}
