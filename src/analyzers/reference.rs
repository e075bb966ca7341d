//! Trailing-window reference statistics for trips the warehouse did not
//! annotate.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use crate::analyzers::utility::{mean, median, sample_stddev};
use crate::calendar::{DayBucket, days_before};
use crate::config::MonitorConfig;
use crate::trip::{Direction, Trip};

/// Comparable-trip key: route, direction, canonical model and day bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub route: String,
    pub direction: Direction,
    pub model: String,
    pub day_bucket: DayBucket,
}

/// Reference statistics over one window of comparable trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceStats {
    pub median: f64,
    pub stddev: f64,
    pub sample_count: u32,
}

impl ReferenceStats {
    pub fn from_efficiencies(values: &[f64]) -> Option<Self> {
        let median = median(values)?;
        Some(Self {
            median,
            stddev: sample_stddev(values, mean(values)),
            sample_count: values.len() as u32,
        })
    }
}

/// Fills `reference_*` on trips that have none.
///
/// Comparables share the trip's [`ReferenceKey`] and ran within
/// `[day - window, day]`; only efficiencies inside the plausible range
/// count. The trip itself is part of its own window. Trips that already carry
/// all three statistics are left as they are. Returns how many trips were
/// filled.
pub fn attach_reference_stats(trips: &mut [Trip], config: &MonitorConfig) -> usize {
    let calendar = config.calendar();

    let keys: Vec<ReferenceKey> = trips
        .iter()
        .map(|t| ReferenceKey {
            route: t.route_key().to_string(),
            direction: t.direction,
            model: t.canonical_model(),
            day_bucket: t.bucket(&calendar),
        })
        .collect();

    let mut samples: HashMap<&ReferenceKey, Vec<(NaiveDate, f64)>> = HashMap::new();
    for (trip, key) in trips.iter().zip(&keys) {
        if let Some(eff) = trip.efficiency() {
            if (config.min_kml..=config.max_kml).contains(&eff) {
                samples.entry(key).or_default().push((trip.day, eff));
            }
        }
    }
    for series in samples.values_mut() {
        series.sort_by_key(|(day, _)| *day);
    }

    let mut filled = 0;
    for (trip, key) in trips.iter_mut().zip(&keys) {
        let has_stats = trip.reference_median.is_some()
            && trip.reference_stddev.is_some()
            && trip.reference_sample_count.is_some();
        if has_stats {
            continue;
        }

        let Some(series) = samples.get(key) else {
            continue;
        };
        let from = days_before(trip.day, config.reference_window_days);
        let lo = series.partition_point(|(day, _)| *day < from);
        let hi = series.partition_point(|(day, _)| *day <= trip.day);
        let values: Vec<f64> = series[lo..hi].iter().map(|(_, eff)| *eff).collect();

        if let Some(stats) = ReferenceStats::from_efficiencies(&values) {
            trip.reference_median = Some(stats.median);
            trip.reference_stddev = Some(stats.stddev);
            trip.reference_sample_count = Some(stats.sample_count);
            filled += 1;
        }
    }

    debug!(
        trips = trips.len(),
        groups = samples.len(),
        filled,
        "Reference statistics attached"
    );

    filled
}
