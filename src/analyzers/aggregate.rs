use std::collections::{BTreeMap, HashSet};

use crate::analyzers::classifier::ClassifiedTrip;
use crate::analyzers::status::ConsumptionStatus;
use crate::analyzers::types::{StatusBreakdown, VehicleEvaluation};
use crate::analyzers::utility::{fraction, mean, pct, round2};

/// Groups classified trips by asset and computes each vehicle's aggregate.
///
/// `qualifies` is left `false`; the evaluator decides it. Vehicles come back
/// in asset-id order.
pub fn aggregate_vehicles(trips: &[&ClassifiedTrip]) -> Vec<VehicleEvaluation> {
    let mut by_asset: BTreeMap<&str, Vec<&ClassifiedTrip>> = BTreeMap::new();
    for trip in trips {
        by_asset
            .entry(trip.trip.asset_id.as_str())
            .or_default()
            .push(*trip);
    }

    by_asset
        .into_values()
        .map(|group| aggregate_vehicle(&group))
        .collect()
}

/// Aggregate for one vehicle. `group` must be non-empty and share an asset id.
pub fn aggregate_vehicle(group: &[&ClassifiedTrip]) -> VehicleEvaluation {
    let total = group.len();
    let first = &group[0].trip;

    let below = group.iter().filter(|t| t.is_below_median()).count();
    let suspect_or_low: Vec<&&ClassifiedTrip> =
        group.iter().filter(|t| t.status.is_suspect_or_low()).collect();
    let telemetry = group
        .iter()
        .filter(|t| t.status.is_telemetry_error())
        .count();

    let drivers: HashSet<&str> = suspect_or_low
        .iter()
        .filter_map(|t| t.trip.driver_id.as_deref())
        .filter(|d| !d.trim().is_empty())
        .collect();

    let efficiencies: Vec<f64> = group.iter().map(|t| t.efficiency).collect();

    let statuses: Vec<StatusBreakdown> = ConsumptionStatus::ALL
        .iter()
        .filter_map(|&status| {
            let in_status: Vec<&&ClassifiedTrip> =
                group.iter().filter(|t| t.status == status).collect();
            if in_status.is_empty() {
                return None;
            }
            Some(StatusBreakdown {
                status,
                trips: in_status.len(),
                percentage: round2(pct(in_status.len(), total)),
                fuel_gap_liters: in_status.iter().map(|t| t.fuel_gap_liters()).sum(),
            })
        })
        .collect();

    let excess_liters: f64 = group
        .iter()
        .filter(|t| t.status == ConsumptionStatus::SevereLowPerformance)
        .map(|t| t.excess_liters())
        .sum();

    VehicleEvaluation {
        asset_id: first.asset_id.clone(),
        vehicle_id: first.vehicle_id.clone(),
        model: group[0].model.clone(),
        trip_count: total,
        trips_below_median: below,
        fraction_below_median: fraction(below, total),
        fraction_suspect_or_low: fraction(suspect_or_low.len(), total),
        fraction_telemetry_error: fraction(telemetry, total),
        distinct_drivers: drivers.len(),
        avg_efficiency: mean(&efficiencies),
        excess_liters,
        statuses,
        qualifies: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::classifier::classify_trip;
    use crate::trip::Trip;
    use chrono::NaiveDate;

    fn classified(asset: &str, kml: f64, driver: Option<&str>) -> ClassifiedTrip {
        let day = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let mut trip = Trip::new(asset, day, kml * 10.0, 10.0)
            .with_model("O500")
            .with_reference(5.0, 1.0, 30);
        if let Some(d) = driver {
            trip = trip.with_driver(d);
        }
        classify_trip(&trip, 1.0, 10.0, 10).unwrap()
    }

    #[test]
    fn test_groups_by_asset() {
        let trips = [
            classified("B", 5.0, None),
            classified("A", 5.0, None),
            classified("B", 5.0, None),
        ];
        let refs: Vec<&ClassifiedTrip> = trips.iter().collect();
        let vehicles = aggregate_vehicles(&refs);
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].asset_id, "A");
        assert_eq!(vehicles[1].trip_count, 2);
    }

    #[test]
    fn test_fractions_and_drivers() {
        let trips = [
            classified("A", 3.6, Some("d1")), // -1.4σ suspected
            classified("A", 3.4, Some("d2")), // -1.6σ low
            classified("A", 3.4, Some("d2")),
            classified("A", 2.5, Some("d3")), // severe, not counted as a driver
            classified("A", 8.0, Some("d4")), // telemetry
            classified("A", 4.5, None),
        ];
        let refs: Vec<&ClassifiedTrip> = trips.iter().collect();
        let v = &aggregate_vehicles(&refs)[0];

        assert_eq!(v.trip_count, 6);
        assert_eq!(v.trips_below_median, 5);
        assert_eq!(v.fraction_suspect_or_low, 0.5);
        assert!((v.fraction_telemetry_error - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(v.distinct_drivers, 2);
        assert_eq!(v.count(ConsumptionStatus::LowPerformance), 2);
        assert_eq!(v.status(ConsumptionStatus::LowPerformance).unwrap().percentage, 33.33);
        assert!(v.status(ConsumptionStatus::Normal).is_some());
    }

    #[test]
    fn test_excess_counts_severe_trips_only() {
        // 25 km on 10 L vs 5 km/L median: 5 L over. The 3.4 km/L trip is
        // low, not severe, so it adds nothing.
        let trips = [classified("A", 2.5, None), classified("A", 3.4, None)];
        let refs: Vec<&ClassifiedTrip> = trips.iter().collect();
        let v = &aggregate_vehicles(&refs)[0];
        assert!((v.excess_liters - 5.0).abs() < 1e-9);

        let normal = [classified("A", 5.0, None), classified("A", 5.5, None)];
        let refs: Vec<&ClassifiedTrip> = normal.iter().collect();
        assert_eq!(aggregate_vehicles(&refs)[0].excess_liters, 0.0);
    }

    #[test]
    fn test_status_fuel_gap_is_signed() {
        // 5.5 km/L burns 1 L less than the median predicts, 2.5 km/L 5 L more
        let trips = [
            classified("A", 5.5, None),
            classified("A", 5.5, None),
            classified("A", 2.5, None),
        ];
        let refs: Vec<&ClassifiedTrip> = trips.iter().collect();
        let v = &aggregate_vehicles(&refs)[0];

        let normal = v.status(ConsumptionStatus::Normal).unwrap();
        assert!((normal.fuel_gap_liters + 2.0).abs() < 1e-9);
        let severe = v.status(ConsumptionStatus::SevereLowPerformance).unwrap();
        assert!((severe.fuel_gap_liters - 5.0).abs() < 1e-9);
        assert!((v.excess_liters - 5.0).abs() < 1e-9);
    }
}
