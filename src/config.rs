//! Runtime configuration for classification and rule evaluation.
//!
//! Everything that used to be a process-wide constant (plausible km/L range,
//! minimum comparable trips, diesel price) lives here and is passed
//! explicitly into the pipeline.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use std::env;

use crate::calendar::{HolidayCalendar, MAX_WINDOW_DAYS};

/// Lowest plausible efficiency; anything below is a telemetry glitch.
pub const DEFAULT_MIN_KML: f64 = 1.0;
/// Highest plausible efficiency for the fleet's diesel buses.
pub const DEFAULT_MAX_KML: f64 = 10.0;
/// Comparable trips required before a trip can be classified.
pub const DEFAULT_MIN_SAMPLES: u32 = 10;
/// Trailing window for reference statistics.
pub const DEFAULT_REFERENCE_WINDOW_DAYS: u32 = 90;
/// Diesel price (R$/L) used to cost excess fuel.
pub const DEFAULT_DIESEL_PRICE: f64 = 6.0;
pub const DEFAULT_MAX_CONCURRENT_RULES: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub min_kml: f64,
    pub max_kml: f64,
    pub min_samples: u32,
    pub reference_window_days: u32,
    pub diesel_price: f64,
    pub max_concurrent_rules: usize,
    /// One-off holidays on top of the fixed calendar.
    pub extra_holidays: Vec<NaiveDate>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_kml: DEFAULT_MIN_KML,
            max_kml: DEFAULT_MAX_KML,
            min_samples: DEFAULT_MIN_SAMPLES,
            reference_window_days: DEFAULT_REFERENCE_WINDOW_DAYS,
            diesel_price: DEFAULT_DIESEL_PRICE,
            max_concurrent_rules: DEFAULT_MAX_CONCURRENT_RULES,
            extra_holidays: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Reads `FUEL_WATCH_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep their
    /// defaults, unparseable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            min_kml: parse_or(&lookup, "FUEL_WATCH_MIN_KML", defaults.min_kml)?,
            max_kml: parse_or(&lookup, "FUEL_WATCH_MAX_KML", defaults.max_kml)?,
            min_samples: parse_or(&lookup, "FUEL_WATCH_MIN_SAMPLES", defaults.min_samples)?,
            reference_window_days: parse_or(
                &lookup,
                "FUEL_WATCH_REFERENCE_WINDOW_DAYS",
                defaults.reference_window_days,
            )?,
            diesel_price: parse_or(&lookup, "FUEL_WATCH_DIESEL_PRICE", defaults.diesel_price)?,
            max_concurrent_rules: parse_or(
                &lookup,
                "FUEL_WATCH_MAX_CONCURRENT_RULES",
                defaults.max_concurrent_rules,
            )?,
            extra_holidays: match lookup("FUEL_WATCH_EXTRA_HOLIDAYS") {
                Some(raw) => parse_dates(&raw)?,
                None => Vec::new(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_kml.is_finite() && self.max_kml.is_finite()) {
            bail!("km/L bounds must be finite");
        }
        if self.min_kml <= 0.0 || self.min_kml >= self.max_kml {
            bail!(
                "invalid km/L range [{}, {}]: need 0 < min < max",
                self.min_kml,
                self.max_kml
            );
        }
        if self.diesel_price < 0.0 || !self.diesel_price.is_finite() {
            bail!("FUEL_WATCH_DIESEL_PRICE must be a non-negative number");
        }
        if self.reference_window_days > MAX_WINDOW_DAYS {
            bail!(
                "FUEL_WATCH_REFERENCE_WINDOW_DAYS must be at most {}",
                MAX_WINDOW_DAYS
            );
        }
        if self.max_concurrent_rules == 0 {
            bail!("FUEL_WATCH_MAX_CONCURRENT_RULES must be at least 1");
        }
        Ok(())
    }

    pub fn calendar(&self) -> HolidayCalendar {
        HolidayCalendar::goiania().with_extra_dates(self.extra_holidays.iter().copied())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {}: {:?}", key, raw)),
    }
}

fn parse_dates(raw: &str) -> Result<Vec<NaiveDate>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid holiday date {:?}: {}", s, e))
        })
        .collect()
}
