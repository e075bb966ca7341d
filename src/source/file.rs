use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{TripQuery, TripSource};
use crate::trip::Trip;

/// Reads trips from a CSV export, or from every `.csv` file in a directory.
#[derive(Debug, Clone)]
pub struct CsvTripSource {
    path: PathBuf,
}

impl CsvTripSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)
            .with_context(|| format!("reading trip directory {}", self.path.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_trips(path: &Path, query: &TripQuery, out: &mut Vec<Trip>) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);

    for (line, result) in rdr.deserialize().enumerate() {
        let trip: Trip =
            result.with_context(|| format!("{}: record {}", path.display(), line + 1))?;
        if query.matches(&trip) {
            out.push(trip);
        }
    }

    Ok(())
}

#[async_trait]
impl TripSource for CsvTripSource {
    async fn fetch_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let files = self.files()?;
        let query = query.clone();

        let trips = tokio::task::spawn_blocking(move || -> Result<Vec<Trip>> {
            let mut trips = Vec::new();
            for path in &files {
                read_trips(path, &query, &mut trips)?;
            }
            Ok(trips)
        })
        .await??;

        debug!(path = %self.path.display(), trips = trips.len(), "Trips loaded");
        Ok(trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::Direction;
    use chrono::NaiveDate;

    const HEADER: &str = "vehicle_id,asset_id,driver_id,vehicle_model,line,sub_line,direction,distance_km,fuel_liters,duration_secs,day,started_at,day_bucket,reference_median,reference_stddev,reference_sample_count";

    fn write(dir: &Path, name: &str, rows: &[&str]) {
        let mut body = format!("{HEADER}\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_reads_file_with_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "trips.csv",
            &[
                "V1,A1,D1,Induscar,105,105A,IDA,40.0,10.0,3600,2025-03-12,2025-03-12T06:10:00,SEG_SEX,5.0,1.0,30",
                "V1,A1,,Induscar,105,,volta,38.0,9.5,,2025-03-12,,,,,",
            ],
        );

        let source = CsvTripSource::new(dir.path().join("trips.csv"));
        let trips = source.fetch_trips(&TripQuery::default()).await.unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].direction, Direction::Outbound);
        assert_eq!(trips[0].reference_sample_count, Some(30));
        assert_eq!(trips[1].direction, Direction::Return);
        assert_eq!(trips[1].driver_id, None);
        assert_eq!(trips[1].reference_median, None);
    }

    #[tokio::test]
    async fn test_reads_directory_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.csv", &["V1,A1,,O500,10,,ida,40,10,,2025-03-01,,,,,"]);
        write(dir.path(), "b.csv", &["V2,A2,,O500,10,,ida,40,10,,2025-03-20,,,,,"]);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = CsvTripSource::new(dir.path());
        let all = source.fetch_trips(&TripQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        let recent = source
            .fetch_trips(&TripQuery::between(day(10), day(31)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].asset_id, "A2");
    }

    #[tokio::test]
    async fn test_bad_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.csv", &["V1,A1,,O500,10,,sideways,40,10,,2025-03-01,,,,,"]);
        let source = CsvTripSource::new(dir.path());
        assert!(source.fetch_trips(&TripQuery::default()).await.is_err());
    }
}
