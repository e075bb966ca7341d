//! Raw trip records as supplied by the telemetry warehouse.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::calendar::{DayBucket, HolidayCalendar, time_slot};
use crate::vehicle_model::canonicalize_model;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "IDA", alias = "ida")]
    Outbound,
    #[serde(alias = "VOLTA", alias = "volta")]
    Return,
}

/// One vehicle traversal of a line in one direction.
///
/// Reference statistics (`reference_*`) come from the warehouse when it has
/// already computed them; otherwise
/// [`attach_reference_stats`](crate::analyzers::reference::attach_reference_stats)
/// fills them in from the trip history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub vehicle_id: String,
    pub asset_id: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    pub vehicle_model: String,
    pub line: String,
    #[serde(default)]
    pub sub_line: Option<String>,
    pub direction: Direction,

    pub distance_km: f64,
    pub fuel_liters: f64,
    #[serde(default)]
    pub duration_secs: Option<u64>,

    pub day: NaiveDate,
    #[serde(default)]
    pub started_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub day_bucket: Option<DayBucket>,

    #[serde(default)]
    pub reference_median: Option<f64>,
    #[serde(default)]
    pub reference_stddev: Option<f64>,
    #[serde(default)]
    pub reference_sample_count: Option<u32>,
}

impl Trip {
    /// Minimal trip; identifiers other than the asset id are placeholders
    /// until set with the `with_*` builders.
    pub fn new(asset_id: &str, day: NaiveDate, distance_km: f64, fuel_liters: f64) -> Self {
        Trip {
            vehicle_id: asset_id.to_string(),
            asset_id: asset_id.to_string(),
            driver_id: None,
            vehicle_model: String::new(),
            line: String::new(),
            sub_line: None,
            direction: Direction::Outbound,
            distance_km,
            fuel_liters,
            duration_secs: None,
            day,
            started_at: None,
            day_bucket: None,
            reference_median: None,
            reference_stddev: None,
            reference_sample_count: None,
        }
    }

    pub fn with_vehicle_id(mut self, vehicle_id: &str) -> Self {
        self.vehicle_id = vehicle_id.to_string();
        self
    }

    pub fn with_driver(mut self, driver_id: &str) -> Self {
        self.driver_id = Some(driver_id.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.vehicle_model = model.to_string();
        self
    }

    pub fn with_route(mut self, line: &str, direction: Direction) -> Self {
        self.line = line.to_string();
        self.direction = direction;
        self
    }

    pub fn with_day_bucket(mut self, bucket: DayBucket) -> Self {
        self.day_bucket = Some(bucket);
        self
    }

    pub fn with_reference(mut self, median: f64, stddev: f64, sample_count: u32) -> Self {
        self.reference_median = Some(median);
        self.reference_stddev = Some(stddev);
        self.reference_sample_count = Some(sample_count);
        self
    }

    /// Observed km per liter, or `None` when no fuel was recorded or the
    /// readings are not finite.
    pub fn efficiency(&self) -> Option<f64> {
        if !self.distance_km.is_finite() || !self.fuel_liters.is_finite() {
            return None;
        }
        if self.fuel_liters <= 0.0 {
            return None;
        }
        Some(self.distance_km / self.fuel_liters)
    }

    pub fn canonical_model(&self) -> String {
        canonicalize_model(&self.vehicle_model)
    }

    /// Stored bucket if the warehouse supplied one, otherwise derived from
    /// the calendar.
    pub fn bucket(&self, calendar: &HolidayCalendar) -> DayBucket {
        self.day_bucket
            .unwrap_or_else(|| DayBucket::of(self.day, calendar))
    }

    /// Sub-line if known, else the line number.
    pub fn route_key(&self) -> &str {
        self.sub_line.as_deref().unwrap_or(&self.line)
    }

    pub fn time_slot(&self) -> Option<String> {
        self.started_at.map(time_slot)
    }

    /// Average speed in km/h, when the duration is known.
    pub fn avg_speed_kmh(&self) -> Option<f64> {
        match self.duration_secs {
            Some(secs) if secs > 0 => Some(3600.0 * self.distance_km / secs as f64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()
    }

    #[test]
    fn test_efficiency() {
        let trip = Trip::new("A1", day(), 30.0, 10.0);
        assert_eq!(trip.efficiency(), Some(3.0));
    }

    #[test]
    fn test_efficiency_without_fuel_is_none() {
        assert_eq!(Trip::new("A1", day(), 30.0, 0.0).efficiency(), None);
        assert_eq!(Trip::new("A1", day(), f64::NAN, 10.0).efficiency(), None);
    }

    #[test]
    fn test_bucket_prefers_stored_value() {
        let cal = HolidayCalendar::goiania();
        let trip = Trip::new("A1", day(), 30.0, 10.0);
        assert_eq!(trip.bucket(&cal), DayBucket::Weekday);

        let trip = trip.with_day_bucket(DayBucket::Holiday);
        assert_eq!(trip.bucket(&cal), DayBucket::Holiday);
    }

    #[test]
    fn test_route_key_falls_back_to_line() {
        let mut trip = Trip::new("A1", day(), 30.0, 10.0).with_route("105", Direction::Return);
        assert_eq!(trip.route_key(), "105");
        trip.sub_line = Some("105-1".to_string());
        assert_eq!(trip.route_key(), "105-1");
    }

    #[test]
    fn test_speed_and_slot() {
        let mut trip = Trip::new("A1", day(), 30.0, 10.0);
        assert_eq!(trip.avg_speed_kmh(), None);
        trip.duration_secs = Some(3600);
        trip.started_at = day().and_hms_opt(6, 31, 0);
        assert_eq!(trip.avg_speed_kmh(), Some(30.0));
        assert_eq!(trip.time_slot().as_deref(), Some("06:30"));
    }

    #[test]
    fn test_canonical_model() {
        let trip = Trip::new("A1", day(), 30.0, 10.0).with_model("Induscar");
        assert_eq!(trip.canonical_model(), "INDUSCAR");
    }
}
