//! Per-trip consumption classification against the reference median.

use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::analyzers::status::ConsumptionStatus;
use crate::calendar::{DayBucket, HolidayCalendar};
use crate::config::MonitorConfig;
use crate::trip::Trip;

static DEFAULT_CALENDAR: LazyLock<HolidayCalendar> = LazyLock::new(HolidayCalendar::goiania);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    MissingEfficiency,
    EfficiencyOutOfRange,
    MissingReference,
    InvalidReference,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidReason::MissingEfficiency => "efficiency could not be computed",
            InvalidReason::EfficiencyOutOfRange => "efficiency outside the plausible range",
            InvalidReason::MissingReference => "reference statistics missing",
            InvalidReason::InvalidReference => "reference statistics not usable",
        };
        f.write_str(s)
    }
}

/// Why a trip was left out of classification. Excluded trips are dropped from
/// every downstream count; this is never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Exclusion {
    #[error("invalid trip data: {0}")]
    InvalidTripData(InvalidReason),
    #[error("insufficient samples: {count} comparable trips, {required} required")]
    InsufficientSamples { count: u32, required: u32 },
}

/// A trip that passed the eligibility checks, with its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTrip {
    pub trip: Trip,
    /// Canonical vehicle model.
    pub model: String,
    pub day_bucket: DayBucket,
    /// km/L.
    pub efficiency: f64,
    pub reference_median: f64,
    pub reference_stddev: f64,
    /// `efficiency - reference_median`.
    pub deviation: f64,
    /// `deviation / reference_stddev`.
    pub sigma_distance: f64,
    pub status: ConsumptionStatus,
}

impl ClassifiedTrip {
    pub fn is_below_median(&self) -> bool {
        self.deviation < 0.0
    }

    /// Liters the trip would have burned at the reference median.
    pub fn expected_fuel_liters(&self) -> f64 {
        self.trip.distance_km / self.reference_median
    }

    /// Burned minus expected liters; negative when the trip beat the median.
    pub fn fuel_gap_liters(&self) -> f64 {
        self.trip.fuel_liters - self.expected_fuel_liters()
    }

    /// Absolute gap between burned and expected liters.
    pub fn excess_liters(&self) -> f64 {
        self.fuel_gap_liters().abs()
    }
}

/// Classification thresholds plus the calendar used for trips that arrive
/// without a day bucket.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub min_kml: f64,
    pub max_kml: f64,
    pub min_samples: u32,
    calendar: HolidayCalendar,
}

impl Classifier {
    pub fn new(min_kml: f64, max_kml: f64, min_samples: u32) -> Self {
        Self {
            min_kml,
            max_kml,
            min_samples,
            calendar: DEFAULT_CALENDAR.clone(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            min_kml: config.min_kml,
            max_kml: config.max_kml,
            min_samples: config.min_samples,
            calendar: config.calendar(),
        }
    }

    pub fn classify(&self, trip: &Trip) -> Result<ClassifiedTrip, Exclusion> {
        classify_in(trip, self.min_kml, self.max_kml, self.min_samples, &self.calendar)
    }

    /// Classifies a batch, keeping exclusion tallies instead of the excluded
    /// trips themselves.
    pub fn classify_all(&self, trips: &[Trip]) -> ClassificationBatch {
        let mut batch = ClassificationBatch::default();

        for trip in trips {
            match self.classify(trip) {
                Ok(classified) => batch.classified.push(classified),
                Err(Exclusion::InvalidTripData(_)) => batch.invalid += 1,
                Err(Exclusion::InsufficientSamples { .. }) => batch.insufficient_samples += 1,
            }
        }

        debug!(
            total = trips.len(),
            classified = batch.classified.len(),
            invalid = batch.invalid,
            insufficient_samples = batch.insufficient_samples,
            "Trip batch classified"
        );

        batch
    }
}

#[derive(Debug, Default)]
pub struct ClassificationBatch {
    pub classified: Vec<ClassifiedTrip>,
    pub invalid: usize,
    pub insufficient_samples: usize,
}

impl ClassificationBatch {
    pub fn excluded(&self) -> usize {
        self.invalid + self.insufficient_samples
    }
}

/// Classifies one trip, explaining why when it is not eligible.
pub fn try_classify(
    trip: &Trip,
    min_kml: f64,
    max_kml: f64,
    min_samples: u32,
) -> Result<ClassifiedTrip, Exclusion> {
    classify_in(trip, min_kml, max_kml, min_samples, &DEFAULT_CALENDAR)
}

/// Classifies one trip; `None` when it is excluded.
pub fn classify_trip(
    trip: &Trip,
    min_kml: f64,
    max_kml: f64,
    min_samples: u32,
) -> Option<ClassifiedTrip> {
    try_classify(trip, min_kml, max_kml, min_samples).ok()
}

fn classify_in(
    trip: &Trip,
    min_kml: f64,
    max_kml: f64,
    min_samples: u32,
    calendar: &HolidayCalendar,
) -> Result<ClassifiedTrip, Exclusion> {
    let efficiency = trip
        .efficiency()
        .ok_or(Exclusion::InvalidTripData(InvalidReason::MissingEfficiency))?;

    if !(min_kml..=max_kml).contains(&efficiency) {
        return Err(Exclusion::InvalidTripData(
            InvalidReason::EfficiencyOutOfRange,
        ));
    }

    let count = trip
        .reference_sample_count
        .ok_or(Exclusion::InvalidTripData(InvalidReason::MissingReference))?;
    if count < min_samples {
        return Err(Exclusion::InsufficientSamples {
            count,
            required: min_samples,
        });
    }

    let (median, stddev) = match (trip.reference_median, trip.reference_stddev) {
        (Some(m), Some(s)) => (m, s),
        _ => {
            return Err(Exclusion::InvalidTripData(InvalidReason::MissingReference));
        }
    };
    if !median.is_finite() || median <= 0.0 || !stddev.is_finite() || stddev < 0.0 {
        return Err(Exclusion::InvalidTripData(InvalidReason::InvalidReference));
    }

    let deviation = efficiency - median;
    let sigma_distance = sigma_distance(deviation, stddev);

    Ok(ClassifiedTrip {
        trip: trip.clone(),
        model: trip.canonical_model(),
        day_bucket: trip.bucket(calendar),
        efficiency,
        reference_median: median,
        reference_stddev: stddev,
        deviation,
        sigma_distance,
        status: ConsumptionStatus::from_sigma(sigma_distance),
    })
}

/// A zero σ means every comparable trip had the same efficiency: any
/// deviation at all is then infinitely far out.
fn sigma_distance(deviation: f64, stddev: f64) -> f64 {
    if stddev > 0.0 {
        deviation / stddev
    } else if deviation == 0.0 {
        0.0
    } else {
        deviation.signum() * f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn trip(efficiency: f64) -> Trip {
        // 10 liters burned, distance chosen to hit the target km/L
        Trip::new("A1", NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), efficiency * 10.0, 10.0)
            .with_reference(5.0, 1.0, 30)
    }

    #[test]
    fn test_severe_scenario() {
        let c = classify_trip(&trip(3.0), 1.0, 10.0, 10).unwrap();
        assert_eq!(c.deviation, -2.0);
        assert_eq!(c.sigma_distance, -2.0);
        assert_eq!(c.status, ConsumptionStatus::SevereLowPerformance);
        assert!(c.is_below_median());
    }

    #[test]
    fn test_normal_trip() {
        let c = classify_trip(&trip(5.5), 1.0, 10.0, 10).unwrap();
        assert_eq!(c.status, ConsumptionStatus::Normal);
        assert!(!c.is_below_median());
    }

    #[test]
    fn test_insufficient_samples_excluded() {
        let t = trip(4.0).with_reference(5.0, 1.0, 9);
        assert_eq!(
            try_classify(&t, 1.0, 10.0, 10),
            Err(Exclusion::InsufficientSamples {
                count: 9,
                required: 10
            })
        );
        assert!(classify_trip(&t, 1.0, 10.0, 9).is_some());
    }

    #[test]
    fn test_out_of_range_excluded() {
        assert_eq!(
            try_classify(&trip(0.5), 1.0, 10.0, 10),
            Err(Exclusion::InvalidTripData(InvalidReason::EfficiencyOutOfRange))
        );
        assert!(classify_trip(&trip(10.5), 1.0, 10.0, 10).is_none());
        // bounds are inclusive
        assert!(classify_trip(&trip(1.0), 1.0, 10.0, 10).is_some());
        assert!(classify_trip(&trip(10.0), 1.0, 10.0, 10).is_some());
    }

    #[test]
    fn test_missing_fuel_or_reference_excluded() {
        let mut t = trip(4.0);
        t.fuel_liters = 0.0;
        assert_eq!(
            try_classify(&t, 1.0, 10.0, 10),
            Err(Exclusion::InvalidTripData(InvalidReason::MissingEfficiency))
        );

        let mut t = trip(4.0);
        t.reference_median = None;
        assert_eq!(
            try_classify(&t, 1.0, 10.0, 10),
            Err(Exclusion::InvalidTripData(InvalidReason::MissingReference))
        );

        let mut t = trip(4.0);
        t.reference_stddev = Some(-1.0);
        assert_eq!(
            try_classify(&t, 1.0, 10.0, 10),
            Err(Exclusion::InvalidTripData(InvalidReason::InvalidReference))
        );
    }

    #[test]
    fn test_zero_stddev() {
        let t = trip(5.0).with_reference(5.0, 0.0, 30);
        assert_eq!(classify_trip(&t, 1.0, 10.0, 10).unwrap().status, ConsumptionStatus::Normal);

        let t = trip(4.9).with_reference(5.0, 0.0, 30);
        assert_eq!(
            classify_trip(&t, 1.0, 10.0, 10).unwrap().status,
            ConsumptionStatus::SevereLowPerformance
        );
    }

    #[test]
    fn test_model_canonicalised_and_bucket_resolved() {
        let t = trip(5.0).with_model("Induscar");
        let c = classify_trip(&t, 1.0, 10.0, 10).unwrap();
        assert_eq!(c.model, "INDUSCAR");
        assert_eq!(c.day_bucket, DayBucket::Weekday);
    }

    #[test]
    fn test_excess_liters() {
        // 30 km on 10 L against a 5 km/L median: expected 6 L, 4 L excess
        let c = classify_trip(&trip(3.0), 1.0, 10.0, 10).unwrap();
        assert!((c.expected_fuel_liters() - 6.0).abs() < 1e-9);
        assert!((c.excess_liters() - 4.0).abs() < 1e-9);

        // 55 km on 10 L: 11 L expected, one liter saved
        let saver = classify_trip(&trip(5.5), 1.0, 10.0, 10).unwrap();
        assert!((saver.fuel_gap_liters() + 1.0).abs() < 1e-9);
        assert!((saver.excess_liters() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_classify_all_tallies_exclusions() {
        let trips = vec![
            trip(3.0),
            trip(0.2),
            trip(4.0).with_reference(5.0, 1.0, 2),
            trip(5.0),
        ];
        let batch = Classifier::new(1.0, 10.0, 10).classify_all(&trips);
        assert_eq!(batch.classified.len(), 2);
        assert_eq!(batch.invalid, 1);
        assert_eq!(batch.insufficient_samples, 1);
        assert_eq!(batch.excluded(), 2);
    }
}
