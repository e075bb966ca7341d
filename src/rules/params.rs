use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::lenient;
use crate::analyzers::classifier::ClassifiedTrip;
use crate::calendar::{DayBucket, days_before};
use crate::vehicle_model::canonicalize_model;

/// Lookback used when a rule does not say otherwise.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Model-filter entries that mean "every model".
const ALL_MODELS: &[&str] = &["TODOS", "ALL", "*"];

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

/// Which trips a rule looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleScope {
    /// Raw or canonical model names; empty means all models.
    #[serde(default)]
    pub models: Vec<String>,
    /// `None` means every day type.
    #[serde(default)]
    pub day_bucket: Option<DayBucket>,
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
}

impl Default for RuleScope {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            day_bucket: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl RuleScope {
    pub fn all_models(&self) -> bool {
        self.models.is_empty()
            || self
                .models
                .iter()
                .any(|m| ALL_MODELS.contains(&m.trim().to_uppercase().as_str()))
    }

    /// `canonical` must already be canonicalised; filter entries are
    /// canonicalised here so either spelling can be used in a rule.
    pub fn matches_model(&self, canonical: &str) -> bool {
        self.all_models() || self.models.iter().any(|m| canonicalize_model(m) == canonical)
    }

    /// Inclusive `[as_of - lookback_days, as_of]`; the start saturates at
    /// the earliest representable date.
    pub fn window(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        (days_before(as_of, self.lookback_days), as_of)
    }

    pub fn contains(&self, trip: &ClassifiedTrip, as_of: NaiveDate) -> bool {
        let (start, end) = self.window(as_of);
        let day = trip.trip.day;

        day >= start
            && day <= end
            && self.day_bucket.is_none_or(|b| b == trip.day_bucket)
            && self.matches_model(&trip.model)
    }
}

/// Trigger thresholds. `None` disables a threshold, which is the same as a
/// threshold of 0. Fractions are in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    #[serde(default, deserialize_with = "lenient::fraction")]
    pub min_below_median_fraction: Option<f64>,
    #[serde(default, deserialize_with = "lenient::fraction")]
    pub min_suspect_or_low_fraction: Option<f64>,
    #[serde(default, deserialize_with = "lenient::fraction")]
    pub min_telemetry_error_fraction: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub min_distinct_drivers: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub min_trips: Option<u32>,
}

fn floor(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(0.0)
}

impl RuleThresholds {
    pub fn below_median_floor(&self) -> f64 {
        floor(self.min_below_median_fraction)
    }

    pub fn suspect_or_low_floor(&self) -> f64 {
        floor(self.min_suspect_or_low_fraction)
    }

    pub fn telemetry_error_floor(&self) -> f64 {
        floor(self.min_telemetry_error_fraction)
    }

    pub fn drivers_floor(&self) -> usize {
        self.min_distinct_drivers.unwrap_or(0) as usize
    }

    pub fn trips_floor(&self) -> usize {
        self.min_trips.unwrap_or(0) as usize
    }

    pub fn with_below_median(mut self, fraction: f64) -> Self {
        self.min_below_median_fraction = Some(fraction);
        self
    }

    pub fn with_suspect_or_low(mut self, fraction: f64) -> Self {
        self.min_suspect_or_low_fraction = Some(fraction);
        self
    }

    pub fn with_telemetry_error(mut self, fraction: f64) -> Self {
        self.min_telemetry_error_fraction = Some(fraction);
        self
    }

    pub fn with_min_drivers(mut self, drivers: u32) -> Self {
        self.min_distinct_drivers = Some(drivers);
        self
    }

    pub fn with_min_trips(mut self, trips: u32) -> Self {
        self.min_trips = Some(trips);
        self
    }
}

/// Converts an operator-entered percentage (0–100) to a fraction. Anything
/// that is not a non-negative number disables the threshold.
pub fn percent_to_fraction(percent: Option<f64>) -> Option<f64> {
    percent
        .filter(|p| p.is_finite() && *p >= 0.0)
        .map(|p| p / 100.0)
}

/// Everything the evaluator needs to know about a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub name: String,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub thresholds: RuleThresholds,
}

impl RuleParams {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: RuleScope::default(),
            thresholds: RuleThresholds::default(),
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.scope.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_day_bucket(mut self, bucket: DayBucket) -> Self {
        self.scope.day_bucket = Some(bucket);
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.scope.lookback_days = days;
        self
    }

    pub fn with_thresholds(mut self, thresholds: RuleThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}
