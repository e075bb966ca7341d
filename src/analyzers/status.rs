use serde::{Deserialize, Serialize};
use std::fmt;

/// Below-median distance (in σ) where a trip becomes suspect.
pub const SUSPECT_SIGMA: f64 = 1.0;
/// Below-median distance (in σ) where a trip is low performance.
pub const LOW_SIGMA: f64 = 1.5;
/// Below-median distance (in σ) where a trip is severe low performance.
pub const SEVERE_SIGMA: f64 = 2.0;
/// Above-median distance (in σ) beyond which the reading is treated as a
/// sensor fault: a bus does not beat its route median by that much.
pub const TELEMETRY_SIGMA: f64 = 2.0;

/// Consumption status of a classified trip.
///
/// `z` is `(efficiency - median) / σ`. Each band contains its
/// closer-to-median bound and excludes the far one:
///
/// | z                  | Status                       |
/// |--------------------|------------------------------|
/// | > 2.0              | `TELEMETRY_ERROR_SUSPECT`    |
/// | (-1.0, 2.0]        | `NORMAL`                     |
/// | (-1.5, -1.0]       | `SUSPECTED_LOW_PERFORMANCE`  |
/// | (-2.0, -1.5]       | `LOW_PERFORMANCE`            |
/// | <= -2.0            | `SEVERE_LOW_PERFORMANCE`     |
///
/// z = +2.0 exactly is `NORMAL`. The operator legend prints the telemetry
/// band as `>= 2.0 STD`; the closer-to-median rule takes precedence at the
/// boundary, as it does for every other band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumptionStatus {
    Normal,
    SuspectedLowPerformance,
    LowPerformance,
    SevereLowPerformance,
    TelemetryErrorSuspect,
}

impl ConsumptionStatus {
    pub const ALL: [ConsumptionStatus; 5] = [
        ConsumptionStatus::Normal,
        ConsumptionStatus::SuspectedLowPerformance,
        ConsumptionStatus::LowPerformance,
        ConsumptionStatus::SevereLowPerformance,
        ConsumptionStatus::TelemetryErrorSuspect,
    ];

    /// Buckets a signed σ-distance from the median.
    pub fn from_sigma(z: f64) -> Self {
        match z {
            z if z > TELEMETRY_SIGMA => ConsumptionStatus::TelemetryErrorSuspect,
            z if z <= -SEVERE_SIGMA => ConsumptionStatus::SevereLowPerformance,
            z if z <= -LOW_SIGMA => ConsumptionStatus::LowPerformance,
            z if z <= -SUSPECT_SIGMA => ConsumptionStatus::SuspectedLowPerformance,
            _ => ConsumptionStatus::Normal,
        }
    }

    /// Driving-performance rank: 0 for normal trips (and for telemetry
    /// faults, which say nothing about the driver) up to 3 for severe.
    pub fn severity(&self) -> u8 {
        match self {
            ConsumptionStatus::Normal | ConsumptionStatus::TelemetryErrorSuspect => 0,
            ConsumptionStatus::SuspectedLowPerformance => 1,
            ConsumptionStatus::LowPerformance => 2,
            ConsumptionStatus::SevereLowPerformance => 3,
        }
    }

    /// Trips that count toward a rule's performance threshold and distinct
    /// driver count.
    pub fn is_suspect_or_low(&self) -> bool {
        matches!(
            self,
            ConsumptionStatus::SuspectedLowPerformance | ConsumptionStatus::LowPerformance
        )
    }

    pub fn is_telemetry_error(&self) -> bool {
        matches!(self, ConsumptionStatus::TelemetryErrorSuspect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionStatus::Normal => "NORMAL",
            ConsumptionStatus::SuspectedLowPerformance => "SUSPECTED_LOW_PERFORMANCE",
            ConsumptionStatus::LowPerformance => "LOW_PERFORMANCE",
            ConsumptionStatus::SevereLowPerformance => "SEVERE_LOW_PERFORMANCE",
            ConsumptionStatus::TelemetryErrorSuspect => "TELEMETRY_ERROR_SUSPECT",
        }
    }
}

impl fmt::Display for ConsumptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
