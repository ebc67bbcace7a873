use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{Sample, ZoneThresholds};

/// Default cap on the time a single sample gap may contribute (seconds)
pub const DEFAULT_GAP_CAP_SEC: f64 = 5.0;

/// Seconds spent in each zone S0..S5
pub type ZoneSeconds = [f64; ZoneThresholds::ZONE_COUNT];

/// Time-in-zone aggregation over heart-rate samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneAggregator {
    thresholds: ZoneThresholds,
    gap_cap_sec: f64,
}

impl ZoneAggregator {
    pub fn new(thresholds: ZoneThresholds, gap_cap_sec: f64) -> Self {
        Self {
            thresholds,
            gap_cap_sec,
        }
    }

    pub fn thresholds(&self) -> &ZoneThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: ZoneThresholds) {
        self.thresholds = thresholds;
    }

    pub fn gap_cap_sec(&self) -> f64 {
        self.gap_cap_sec
    }

    /// See [`zone_seconds`]
    pub fn compute(&self, samples: &[Sample]) -> ZoneSeconds {
        zone_seconds(samples, &self.thresholds, self.gap_cap_sec)
    }

    /// Zone totals together with percentages of the covered time
    pub fn distribution(&self, samples: &[Sample]) -> ZoneDistribution {
        ZoneDistribution::from_seconds(self.compute(samples))
    }
}

impl Default for ZoneAggregator {
    fn default() -> Self {
        Self::new(ZoneThresholds::default(), DEFAULT_GAP_CAP_SEC)
    }
}

/// Time-in-zone totals for an ordered heart-rate series.
///
/// Each consecutive pair attributes `min(gap_cap_sec, dt)` to the zone of the
/// earlier sample, so a long connectivity gap is not charged entirely to the
/// zone that preceded it. Fewer than two samples yields all zeros. Pairs that
/// run backwards in time contribute nothing.
pub fn zone_seconds(samples: &[Sample], thresholds: &ZoneThresholds, gap_cap_sec: f64) -> ZoneSeconds {
    let mut totals = [0.0; ZoneThresholds::ZONE_COUNT];

    for pair in samples.windows(2) {
        let dt = (pair[1].timestamp - pair[0].timestamp).max(0) as f64 / 1000.0;
        let zone = thresholds.zone_of(pair[0].value);
        totals[zone] += dt.min(gap_cap_sec);
    }

    totals
}

/// Zone totals in seconds with their share of the total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDistribution {
    pub seconds: ZoneSeconds,
    pub total_seconds: f64,
    /// Percent of `total_seconds`, two decimal places
    pub percent: [Decimal; ZoneThresholds::ZONE_COUNT],
}

impl ZoneDistribution {
    pub fn from_seconds(seconds: ZoneSeconds) -> Self {
        let total_seconds: f64 = seconds.iter().sum();
        let mut percent = [Decimal::ZERO; ZoneThresholds::ZONE_COUNT];

        if total_seconds > 0.0 {
            let total = Decimal::from_f64(total_seconds).unwrap_or(Decimal::ONE);
            for (slot, secs) in percent.iter_mut().zip(seconds.iter()) {
                let part = Decimal::from_f64(*secs).unwrap_or(Decimal::ZERO);
                *slot = (part / total * dec!(100)).round_dp(2);
            }
        }

        Self {
            seconds,
            total_seconds,
            percent,
        }
    }

    /// Zone with the most time, `None` when nothing was recorded
    pub fn dominant_zone(&self) -> Option<usize> {
        if self.total_seconds <= 0.0 {
            return None;
        }
        self.seconds
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(zone, _)| zone)
    }

    /// Display label for a zone index
    pub fn zone_label(zone: usize) -> String {
        format!("S{}", zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleSource;
    use proptest::prelude::*;

    fn thresholds() -> ZoneThresholds {
        ZoneThresholds::new([100.0, 120.0, 140.0, 160.0, 180.0])
    }

    fn series(points: &[(i64, f64)]) -> Vec<Sample> {
        points
            .iter()
            .map(|&(ts, v)| Sample::new(ts, v, SampleSource::Device))
            .collect()
    }

    #[test]
    fn test_zone_seconds_basic() {
        let samples = series(&[(0, 90.0), (2000, 130.0), (5000, 185.0), (6000, 185.0)]);
        let totals = zone_seconds(&samples, &thresholds(), 5.0);
        assert_eq!(totals, [2.0, 0.0, 3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gap_is_capped() {
        let samples = series(&[(0, 150.0), (60_000, 150.0)]);
        let totals = zone_seconds(&samples, &thresholds(), 5.0);
        assert_eq!(totals[3], 5.0);
        assert_eq!(totals.iter().sum::<f64>(), 5.0);
    }

    #[test]
    fn test_undersized_input_is_zero() {
        assert_eq!(zone_seconds(&[], &thresholds(), 5.0), [0.0; 6]);
        let single = series(&[(0, 150.0)]);
        assert_eq!(zone_seconds(&single, &thresholds(), 5.0), [0.0; 6]);
    }

    #[test]
    fn test_distribution_percentages() {
        let aggregator = ZoneAggregator::new(thresholds(), 5.0);
        let samples = series(&[(0, 90.0), (1000, 150.0), (4000, 150.0)]);
        let distribution = aggregator.distribution(&samples);

        assert_eq!(distribution.total_seconds, 4.0);
        assert_eq!(distribution.percent[0], dec!(25));
        assert_eq!(distribution.percent[3], dec!(75));
        assert_eq!(distribution.dominant_zone(), Some(3));
    }

    #[test]
    fn test_distribution_empty() {
        let distribution = ZoneDistribution::from_seconds([0.0; 6]);
        assert_eq!(distribution.dominant_zone(), None);
        assert!(distribution.percent.iter().all(|p| p.is_zero()));
    }

    proptest! {
        #[test]
        fn test_conservation_without_long_gaps(
            steps in prop::collection::vec((1i64..5_000, 50.0f64..210.0), 1..200),
            first in 50.0f64..210.0,
        ) {
            let mut ts = 0i64;
            let mut samples = vec![Sample::new(0, first, SampleSource::Device)];
            for (gap, v) in steps {
                ts += gap;
                samples.push(Sample::new(ts, v, SampleSource::Device));
            }
            let totals = zone_seconds(&samples, &thresholds(), DEFAULT_GAP_CAP_SEC);
            let duration = ts as f64 / 1000.0;
            prop_assert!((totals.iter().sum::<f64>() - duration).abs() < 1e-6);
        }

        #[test]
        fn test_sub_ranges_add_up(
            steps in prop::collection::vec((1i64..20_000, 50.0f64..210.0), 2..100),
            split in 1usize..100,
        ) {
            let mut ts = 0i64;
            let samples: Vec<Sample> = steps
                .into_iter()
                .map(|(gap, v)| {
                    ts += gap;
                    Sample::new(ts, v, SampleSource::Device)
                })
                .collect();
            let split = split.min(samples.len() - 1);
            let whole = zone_seconds(&samples, &thresholds(), DEFAULT_GAP_CAP_SEC);
            let left = zone_seconds(&samples[..=split], &thresholds(), DEFAULT_GAP_CAP_SEC);
            let right = zone_seconds(&samples[split..], &thresholds(), DEFAULT_GAP_CAP_SEC);
            for zone in 0..6 {
                prop_assert!((whole[zone] - left[zone] - right[zone]).abs() < 1e-6);
            }
        }
    }
}
