//! Output formatting and persistence for classification and evaluation
//! results.
//!
//! Supports JSON logging, CSV append and gzip compression.

use anyhow::Result;
use chrono::NaiveDate;
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::classifier::ClassifiedTrip;
use crate::analyzers::status::ConsumptionStatus;
use crate::calendar::DayBucket;
use crate::trip::Direction;

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends records as rows to a CSV file.
///
/// Creates the file (and its directory) with headers if it does not already
/// exist; existing files only get new rows.
pub fn append_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> csv::Result<()> {
    let path = path.as_ref();
    let file_exists = path.exists() && fs::metadata(path)?.len() > 0;
    debug!(path = %path.display(), file_exists, rows = records.len(), "Appending CSV records");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes `<path>.gz` next to `path` and returns its location.
pub fn gzip_file(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    debug!(path = %gz_path.display(), "Compressed output");
    Ok(gz_path)
}

/// Flat CSV form of a [`ClassifiedTrip`].
#[derive(Debug, Serialize)]
pub struct ClassifiedRow {
    pub(crate) asset_id: String,
    pub(crate) vehicle_id: String,
    pub(crate) driver_id: Option<String>,
    pub(crate) model: String,
    pub(crate) line: String,
    pub(crate) direction: Direction,
    pub(crate) day: NaiveDate,
    pub(crate) day_bucket: DayBucket,
    pub(crate) time_slot: Option<String>,
    pub(crate) distance_km: f64,
    pub(crate) fuel_liters: f64,
    pub(crate) avg_speed_kmh: Option<f64>,
    pub(crate) efficiency: f64,
    pub(crate) reference_median: f64,
    pub(crate) reference_stddev: f64,
    pub(crate) deviation: f64,
    pub(crate) sigma_distance: f64,
    pub(crate) status: ConsumptionStatus,
}

impl From<&ClassifiedTrip> for ClassifiedRow {
    fn from(c: &ClassifiedTrip) -> Self {
        Self {
            asset_id: c.trip.asset_id.clone(),
            vehicle_id: c.trip.vehicle_id.clone(),
            driver_id: c.trip.driver_id.clone(),
            model: c.model.clone(),
            line: c.trip.route_key().to_string(),
            direction: c.trip.direction,
            day: c.trip.day,
            day_bucket: c.day_bucket,
            time_slot: c.trip.time_slot(),
            distance_km: c.trip.distance_km,
            fuel_liters: c.trip.fuel_liters,
            avg_speed_kmh: c.trip.avg_speed_kmh(),
            efficiency: c.efficiency,
            reference_median: c.reference_median,
            reference_stddev: c.reference_stddev,
            deviation: c.deviation,
            sigma_distance: c.sigma_distance,
            status: c.status,
        }
    }
}
