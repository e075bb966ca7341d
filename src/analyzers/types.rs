//! Result types produced by rule evaluation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::analyzers::status::ConsumptionStatus;

/// Trips of one vehicle that landed in one status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub status: ConsumptionStatus,
    pub trips: usize,
    /// Share of the vehicle's in-scope trips, 0–100, two decimals.
    pub percentage: f64,
    /// Signed sum of burned minus expected liters over these trips.
    pub fuel_gap_liters: f64,
}

/// Per-vehicle aggregate over the trips a rule looked at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleEvaluation {
    pub asset_id: String,
    pub vehicle_id: String,
    pub model: String,

    pub trip_count: usize,
    pub trips_below_median: usize,
    pub fraction_below_median: f64,
    pub fraction_suspect_or_low: f64,
    pub fraction_telemetry_error: f64,
    /// Drivers seen on suspect-or-low trips.
    pub distinct_drivers: usize,

    pub avg_efficiency: f64,
    /// Liters burned beyond the reference median on severe trips.
    pub excess_liters: f64,
    /// Present statuses only, in [`ConsumptionStatus`] order.
    pub statuses: Vec<StatusBreakdown>,

    pub qualifies: bool,
}

impl VehicleEvaluation {
    pub fn status(&self, status: ConsumptionStatus) -> Option<&StatusBreakdown> {
        self.statuses.iter().find(|s| s.status == status)
    }

    pub fn count(&self, status: ConsumptionStatus) -> usize {
        self.status(status).map_or(0, |s| s.trips)
    }
}

/// One rule run against one batch of classified trips.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluationResult {
    pub rule_name: String,
    pub as_of: NaiveDate,
    pub window_start: NaiveDate,
    pub trips_in_scope: usize,
    /// Every vehicle in scope, qualifying or not, by trip count descending.
    pub vehicles: Vec<VehicleEvaluation>,
}

impl RuleEvaluationResult {
    pub fn empty(rule_name: &str, window_start: NaiveDate, as_of: NaiveDate) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            as_of,
            window_start,
            trips_in_scope: 0,
            vehicles: Vec::new(),
        }
    }

    /// `true` when no vehicle qualified.
    pub fn is_empty(&self) -> bool {
        self.qualifying().next().is_none()
    }

    pub fn qualifying(&self) -> impl Iterator<Item = &VehicleEvaluation> {
        self.vehicles.iter().filter(|v| v.qualifies)
    }

    pub fn qualifying_count(&self) -> usize {
        self.qualifying().count()
    }

    pub fn total_excess_liters(&self) -> f64 {
        self.qualifying().map(|v| v.excess_liters).sum()
    }
}
