//! Applies one rule to a batch of classified trips.

use chrono::NaiveDate;
use tracing::debug;

use crate::analyzers::aggregate::aggregate_vehicles;
use crate::analyzers::classifier::ClassifiedTrip;
use crate::analyzers::types::{RuleEvaluationResult, VehicleEvaluation};
use crate::rules::{RuleParams, RuleThresholds};

/// Evaluates `params` against `classified_trips` as of `as_of`.
///
/// Trips outside the rule's day bucket, model filter or lookback window are
/// ignored. Every in-scope vehicle is reported; the ones meeting all the
/// thresholds have `qualifies` set. An empty scope yields an empty result.
pub fn evaluate_rule(
    params: &RuleParams,
    classified_trips: &[ClassifiedTrip],
    as_of: NaiveDate,
) -> RuleEvaluationResult {
    let (window_start, _) = params.scope.window(as_of);

    let in_scope: Vec<&ClassifiedTrip> = classified_trips
        .iter()
        .filter(|t| params.scope.contains(t, as_of))
        .collect();

    if in_scope.is_empty() {
        debug!(rule = %params.name, %as_of, "No trips in rule scope");
        return RuleEvaluationResult::empty(&params.name, window_start, as_of);
    }

    let mut vehicles = aggregate_vehicles(&in_scope);
    for vehicle in &mut vehicles {
        vehicle.qualifies = qualifies(&params.thresholds, vehicle);
    }
    vehicles.sort_by(|a, b| {
        b.trip_count
            .cmp(&a.trip_count)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });

    let result = RuleEvaluationResult {
        rule_name: params.name.clone(),
        as_of,
        window_start,
        trips_in_scope: in_scope.len(),
        vehicles,
    };

    debug!(
        rule = %params.name,
        %as_of,
        trips = result.trips_in_scope,
        vehicles = result.vehicles.len(),
        qualifying = result.qualifying_count(),
        "Rule evaluated"
    );

    result
}

/// A vehicle qualifies when it meets every threshold. Disabled thresholds
/// count as 0 and are always met.
pub fn qualifies(thresholds: &RuleThresholds, vehicle: &VehicleEvaluation) -> bool {
    vehicle.trip_count >= thresholds.trips_floor()
        && vehicle.fraction_below_median >= thresholds.below_median_floor()
        && vehicle.fraction_suspect_or_low >= thresholds.suspect_or_low_floor()
        && vehicle.fraction_telemetry_error >= thresholds.telemetry_error_floor()
        && vehicle.distinct_drivers >= thresholds.drivers_floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::classifier::classify_trip;
    use crate::analyzers::status::ConsumptionStatus;
    use crate::calendar::DayBucket;
    use crate::trip::Trip;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    // Wednesday, inside a 30-day window ending on `as_of`
    fn trip(asset: &str, kml: f64) -> Trip {
        Trip::new(asset, NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), kml * 10.0, 10.0)
            .with_model("Induscar")
            .with_reference(5.0, 1.0, 30)
    }

    fn classify(trips: Vec<Trip>) -> Vec<ClassifiedTrip> {
        trips
            .iter()
            .map(|t| classify_trip(t, 1.0, 10.0, 10).unwrap())
            .collect()
    }

    /// `below` trips at 4.5 km/L, the rest at 5.5.
    fn vehicle(asset: &str, below: usize, total: usize) -> Vec<Trip> {
        (0..total)
            .map(|i| trip(asset, if i < below { 4.5 } else { 5.5 }))
            .collect()
    }

    fn below_median_rule(fraction: f64) -> RuleParams {
        RuleParams::new("below-median")
            .with_thresholds(RuleThresholds::default().with_below_median(fraction))
    }

    #[test]
    fn test_below_median_threshold() {
        let trips = classify(vehicle("A", 6, 10));
        let result = evaluate_rule(&below_median_rule(0.5), &trips, as_of());
        assert_eq!(result.qualifying_count(), 1);
        assert_eq!(result.vehicles[0].fraction_below_median, 0.6);

        let trips = classify(vehicle("A", 4, 10));
        let result = evaluate_rule(&below_median_rule(0.5), &trips, as_of());
        assert!(result.is_empty());
        assert_eq!(result.vehicles.len(), 1);
    }

    #[test]
    fn test_min_trips_excludes_small_vehicles() {
        let trips = classify(vehicle("A", 10, 10));
        let params = RuleParams::new("r")
            .with_thresholds(RuleThresholds::default().with_min_trips(11));
        assert!(evaluate_rule(&params, &trips, as_of()).is_empty());

        let params = RuleParams::new("r")
            .with_thresholds(RuleThresholds::default().with_min_trips(10));
        assert!(!evaluate_rule(&params, &trips, as_of()).is_empty());
    }

    #[test]
    fn test_disabled_thresholds_qualify_everyone() {
        let mut trips = vehicle("A", 0, 3);
        trips.extend(vehicle("B", 2, 2));
        let trips = classify(trips);
        let result = evaluate_rule(&RuleParams::new("all"), &trips, as_of());
        assert_eq!(result.qualifying_count(), 2);
        // ordered by trip count
        assert_eq!(result.vehicles[0].asset_id, "A");
    }

    #[test]
    fn test_garbage_thresholds_are_disabled() {
        let trips = classify(vehicle("A", 0, 3));
        let thresholds = RuleThresholds {
            min_below_median_fraction: Some(f64::NAN),
            min_suspect_or_low_fraction: Some(-0.5),
            ..Default::default()
        };
        let params = RuleParams::new("r").with_thresholds(thresholds);
        assert_eq!(evaluate_rule(&params, &trips, as_of()).qualifying_count(), 1);
    }

    #[test]
    fn test_empty_scope() {
        let trips = classify(vehicle("A", 5, 5));

        let other_model = RuleParams::new("r").with_models(&["O500"]);
        let result = evaluate_rule(&other_model, &trips, as_of());
        assert!(result.is_empty());
        assert!(result.vehicles.is_empty());
        assert_eq!(result.trips_in_scope, 0);

        let weekend = RuleParams::new("r").with_day_bucket(DayBucket::Sunday);
        assert!(evaluate_rule(&weekend, &trips, as_of()).vehicles.is_empty());

        let too_early = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert!(evaluate_rule(&RuleParams::new("r"), &trips, too_early).vehicles.is_empty());

        assert!(evaluate_rule(&RuleParams::new("r"), &[], as_of()).vehicles.is_empty());
    }

    #[test]
    fn test_lookback_window() {
        let trips = classify(vehicle("A", 1, 1));
        // trip on the 12th, as_of the 14th
        let params = RuleParams::new("r").with_lookback_days(1);
        assert!(evaluate_rule(&params, &trips, as_of()).vehicles.is_empty());
        let params = RuleParams::new("r").with_lookback_days(2);
        assert_eq!(evaluate_rule(&params, &trips, as_of()).vehicles.len(), 1);
    }

    #[test]
    fn test_model_filter_uses_canonical_names() {
        let trips = classify(vehicle("A", 1, 1));
        let params = RuleParams::new("r").with_models(&["INDUSCAR"]);
        assert_eq!(evaluate_rule(&params, &trips, as_of()).vehicles.len(), 1);
    }

    #[test]
    fn test_distinct_drivers_threshold() {
        let trips = classify(vec![
            trip("A", 3.6).with_driver("d1"),
            trip("A", 3.6).with_driver("d1"),
            trip("A", 3.6).with_driver("d2"),
        ]);
        let t = RuleThresholds::default().with_suspect_or_low(1.0);
        let two = RuleParams::new("r").with_thresholds(t.clone().with_min_drivers(2));
        let three = RuleParams::new("r").with_thresholds(t.with_min_drivers(3));
        assert!(!evaluate_rule(&two, &trips, as_of()).is_empty());
        assert!(evaluate_rule(&three, &trips, as_of()).is_empty());
    }

    #[test]
    fn test_telemetry_threshold() {
        let trips = classify(vec![trip("A", 8.0), trip("A", 5.0)]);
        let half = RuleParams::new("r")
            .with_thresholds(RuleThresholds::default().with_telemetry_error(0.5));
        let more = RuleParams::new("r")
            .with_thresholds(RuleThresholds::default().with_telemetry_error(0.51));
        assert!(!evaluate_rule(&half, &trips, as_of()).is_empty());
        assert!(evaluate_rule(&more, &trips, as_of()).is_empty());
    }

    #[test]
    fn test_unbounded_lookback_keeps_every_trip() {
        let trips = classify(vehicle("A", 1, 2));
        let params = RuleParams::new("r").with_lookback_days(u32::MAX);
        let result = evaluate_rule(&params, &trips, as_of());
        assert_eq!(result.window_start, NaiveDate::MIN);
        assert_eq!(result.trips_in_scope, 2);
    }

    #[test]
    fn test_all_normal_has_no_excess() {
        let trips = classify(vehicle("A", 0, 4));
        let result = evaluate_rule(&RuleParams::new("r"), &trips, as_of());
        assert_eq!(result.total_excess_liters(), 0.0);

        // four 5.5 km/L trips each burn 1 L less than the median predicts
        let normal = result.vehicles[0].status(ConsumptionStatus::Normal).unwrap();
        assert_eq!(normal.trips, 4);
        assert!((normal.fuel_gap_liters + 4.0).abs() < 1e-9);
    }
}
