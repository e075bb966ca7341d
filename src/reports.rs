//! Published report rows: one pivoted line per qualifying vehicle, one long
//! line per (vehicle, status), plus the per-run summary that goes into the
//! evaluation ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzers::status::ConsumptionStatus;
use crate::analyzers::types::{RuleEvaluationResult, VehicleEvaluation};
use crate::analyzers::utility::round2;

/// Per-vehicle row with a count and a percentage column for every status.
///
/// Percentages are 0–100. Every float is rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReport {
    pub rule_id: u64,
    pub rule_name: String,
    pub execution_day: NaiveDate,
    pub asset_id: String,
    pub vehicle_id: String,
    pub model: String,
    pub total_trips: usize,

    pub normal_trips: usize,
    pub normal_pct: f64,
    pub suspected_trips: usize,
    pub suspected_pct: f64,
    pub low_trips: usize,
    pub low_pct: f64,
    pub severe_trips: usize,
    pub severe_pct: f64,
    pub telemetry_error_trips: usize,
    pub telemetry_error_pct: f64,

    pub below_median_pct: f64,
    pub suspect_or_low_pct: f64,
    pub distinct_drivers: usize,
    pub avg_efficiency: f64,
    pub excess_liters: f64,
    pub excess_cost: f64,
}

impl VehicleReport {
    pub fn new(
        rule_id: u64,
        result: &RuleEvaluationResult,
        vehicle: &VehicleEvaluation,
        diesel_price: f64,
    ) -> Self {
        let count = |s| vehicle.count(s);
        let pct = |s| vehicle.status(s).map_or(0.0, |b| b.percentage);

        Self {
            rule_id,
            rule_name: result.rule_name.clone(),
            execution_day: result.as_of,
            asset_id: vehicle.asset_id.clone(),
            vehicle_id: vehicle.vehicle_id.clone(),
            model: vehicle.model.clone(),
            total_trips: vehicle.trip_count,

            normal_trips: count(ConsumptionStatus::Normal),
            normal_pct: pct(ConsumptionStatus::Normal),
            suspected_trips: count(ConsumptionStatus::SuspectedLowPerformance),
            suspected_pct: pct(ConsumptionStatus::SuspectedLowPerformance),
            low_trips: count(ConsumptionStatus::LowPerformance),
            low_pct: pct(ConsumptionStatus::LowPerformance),
            severe_trips: count(ConsumptionStatus::SevereLowPerformance),
            severe_pct: pct(ConsumptionStatus::SevereLowPerformance),
            telemetry_error_trips: count(ConsumptionStatus::TelemetryErrorSuspect),
            telemetry_error_pct: pct(ConsumptionStatus::TelemetryErrorSuspect),

            below_median_pct: round2(vehicle.fraction_below_median * 100.0),
            suspect_or_low_pct: round2(vehicle.fraction_suspect_or_low * 100.0),
            distinct_drivers: vehicle.distinct_drivers,
            avg_efficiency: round2(vehicle.avg_efficiency),
            excess_liters: round2(vehicle.excess_liters),
            excess_cost: round2(vehicle.excess_liters * diesel_price),
        }
    }
}

/// Rows for the qualifying vehicles, by trip count descending.
pub fn build_vehicle_reports(
    rule_id: u64,
    result: &RuleEvaluationResult,
    diesel_price: f64,
) -> Vec<VehicleReport> {
    let mut rows: Vec<VehicleReport> = result
        .qualifying()
        .map(|v| VehicleReport::new(rule_id, result, v, diesel_price))
        .collect();
    rows.sort_by(|a, b| {
        b.total_trips
            .cmp(&a.total_trips)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    rows
}

/// Long-format row: one status of one qualifying vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub rule_id: u64,
    pub execution_day: NaiveDate,
    pub asset_id: String,
    pub vehicle_id: String,
    pub model: String,
    pub status: ConsumptionStatus,
    pub trips: usize,
    pub total_trips: usize,
    pub percentage: f64,
    /// Signed burned-minus-expected liters for these trips.
    pub fuel_gap_liters: f64,
}

/// Status rows for the qualifying vehicles, in evaluation order and
/// [`ConsumptionStatus`] order within a vehicle.
pub fn build_status_reports(rule_id: u64, result: &RuleEvaluationResult) -> Vec<StatusReport> {
    result
        .qualifying()
        .flat_map(|v| {
            v.statuses.iter().map(move |s| StatusReport {
                rule_id,
                execution_day: result.as_of,
                asset_id: v.asset_id.clone(),
                vehicle_id: v.vehicle_id.clone(),
                model: v.model.clone(),
                status: s.status,
                trips: s.trips,
                total_trips: v.trip_count,
                percentage: s.percentage,
                fuel_gap_liters: round2(s.fuel_gap_liters),
            })
        })
        .collect()
}

/// Ledger line for one (rule, execution day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub rule_id: u64,
    pub rule_name: String,
    pub execution_day: NaiveDate,
    pub window_start: NaiveDate,
    pub trips_in_scope: usize,
    pub vehicles_in_scope: usize,
    pub qualifying_vehicles: usize,
    pub excess_liters: f64,
    pub excess_cost: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub record: EvaluationRecord,
    pub vehicles: Vec<VehicleReport>,
    pub statuses: Vec<StatusReport>,
}

impl EvaluationReport {
    pub fn new(rule_id: u64, result: &RuleEvaluationResult, diesel_price: f64) -> Self {
        let vehicles = build_vehicle_reports(rule_id, result, diesel_price);
        let excess_liters = result.total_excess_liters();

        Self {
            record: EvaluationRecord {
                rule_id,
                rule_name: result.rule_name.clone(),
                execution_day: result.as_of,
                window_start: result.window_start,
                trips_in_scope: result.trips_in_scope,
                vehicles_in_scope: result.vehicles.len(),
                qualifying_vehicles: vehicles.len(),
                excess_liters: round2(excess_liters),
                excess_cost: round2(excess_liters * diesel_price),
                recorded_at: Utc::now(),
            },
            vehicles,
            statuses: build_status_reports(rule_id, result),
        }
    }

    pub fn rule_id(&self) -> u64 {
        self.record.rule_id
    }

    pub fn execution_day(&self) -> NaiveDate {
        self.record.execution_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::evaluator::evaluate_rule;
    use crate::analyzers::classifier::classify_trip;
    use crate::rules::{RuleParams, RuleThresholds};
    use crate::trip::Trip;

    fn result() -> RuleEvaluationResult {
        let day = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let trip = |asset: &str, kml: f64| {
            let t = Trip::new(asset, day, kml * 10.0, 10.0).with_reference(5.0, 1.0, 30);
            classify_trip(&t, 1.0, 10.0, 10).unwrap()
        };
        // A: 3 trips, one severe at 2.5 km/L (5 L over); B: 1 normal trip
        let trips = vec![trip("B", 5.0), trip("A", 2.5), trip("A", 3.6), trip("A", 5.0)];
        let params = RuleParams::new("weekly")
            .with_thresholds(RuleThresholds::default().with_below_median(0.5));
        evaluate_rule(&params, &trips, day)
    }

    #[test]
    fn test_pivot_row() {
        let rows = build_vehicle_reports(7, &result(), 6.0);
        assert_eq!(rows.len(), 1);

        let a = &rows[0];
        assert_eq!((a.rule_id, a.asset_id.as_str()), (7, "A"));
        assert_eq!(a.total_trips, 3);
        assert_eq!((a.severe_trips, a.severe_pct), (1, 33.33));
        assert_eq!((a.suspected_trips, a.suspected_pct), (1, 33.33));
        assert_eq!((a.low_trips, a.low_pct), (0, 0.0));
        assert_eq!(a.below_median_pct, 66.67);
        assert_eq!(a.avg_efficiency, 3.7);
        assert_eq!(a.excess_liters, 5.0);
        assert_eq!(a.excess_cost, 30.0);
    }

    #[test]
    fn test_evaluation_record_totals() {
        let report = EvaluationReport::new(7, &result(), 6.0);
        assert_eq!(report.record.vehicles_in_scope, 2);
        assert_eq!(report.record.qualifying_vehicles, 1);
        assert_eq!(report.record.trips_in_scope, 4);
        assert_eq!(report.record.excess_cost, 30.0);
        assert_eq!(report.rule_id(), 7);
    }

    #[test]
    fn test_status_rows_for_qualifying_vehicles() {
        let rows = build_status_reports(7, &result());
        // A only: severe, suspected and normal
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.asset_id == "A" && r.total_trips == 3));

        let statuses: Vec<ConsumptionStatus> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ConsumptionStatus::Normal,
                ConsumptionStatus::SuspectedLowPerformance,
                ConsumptionStatus::SevereLowPerformance,
            ]
        );
        assert_eq!(rows[2].fuel_gap_liters, 5.0);
        assert_eq!(rows[0].fuel_gap_liters, 0.0);
    }
}
