//! Persistent record of which rules were evaluated on which day.
//!
//! A rule is evaluated at most once per execution day; a second `record` for
//! the same key is refused so reports are never duplicated.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::output::append_records;
use crate::reports::{EvaluationRecord, EvaluationReport, StatusReport, VehicleReport};

pub const EVALUATIONS_FILE: &str = "evaluations.csv";
pub const VEHICLES_FILE: &str = "vehicles.csv";
pub const STATUSES_FILE: &str = "statuses.csv";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("rule {rule_id} was already evaluated for {day}")]
    AlreadyEvaluated { rule_id: u64, day: NaiveDate },
    #[error("report storage: {0}")]
    Csv(#[from] csv::Error),
    #[error("report storage: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ReportStore: Send {
    fn contains(&self, rule_id: u64, day: NaiveDate) -> bool;

    /// Stores the report, or fails with [`ReportError::AlreadyEvaluated`].
    fn record(&mut self, report: &EvaluationReport) -> Result<(), ReportError>;
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: HashMap<(u64, NaiveDate), EvaluationReport>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rule_id: u64, day: NaiveDate) -> Option<&EvaluationReport> {
        self.reports.get(&(rule_id, day))
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl ReportStore for MemoryReportStore {
    fn contains(&self, rule_id: u64, day: NaiveDate) -> bool {
        self.reports.contains_key(&(rule_id, day))
    }

    fn record(&mut self, report: &EvaluationReport) -> Result<(), ReportError> {
        let key = (report.rule_id(), report.execution_day());
        if self.reports.contains_key(&key) {
            return Err(ReportError::AlreadyEvaluated {
                rule_id: key.0,
                day: key.1,
            });
        }
        self.reports.insert(key, report.clone());
        Ok(())
    }
}

/// Ledger, vehicle and status rows as three CSV files in one directory.
///
/// Detail rows are written before the ledger line; a report only counts as
/// recorded once its ledger line is on disk.
#[derive(Debug)]
pub struct CsvReportStore {
    dir: PathBuf,
    recorded: HashSet<(u64, NaiveDate)>,
}

impl CsvReportStore {
    /// Opens (or starts) the store in `dir`, reading back the existing ledger.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ReportError> {
        let dir = dir.as_ref().to_path_buf();

        let recorded = read_rows::<EvaluationRecord>(&dir.join(EVALUATIONS_FILE))?
            .into_iter()
            .map(|r| (r.rule_id, r.execution_day))
            .collect::<HashSet<_>>();

        info!(dir = %dir.display(), evaluations = recorded.len(), "Report store opened");
        Ok(Self { dir, recorded })
    }

    pub fn evaluations_path(&self) -> PathBuf {
        self.dir.join(EVALUATIONS_FILE)
    }

    pub fn vehicles_path(&self) -> PathBuf {
        self.dir.join(VEHICLES_FILE)
    }

    pub fn statuses_path(&self) -> PathBuf {
        self.dir.join(STATUSES_FILE)
    }

    /// Most recent execution day recorded for `rule_id`.
    pub fn latest_day(&self, rule_id: u64) -> Option<NaiveDate> {
        self.recorded
            .iter()
            .filter(|(id, _)| *id == rule_id)
            .map(|(_, day)| *day)
            .max()
    }

    /// Reads the report for (`rule_id`, `day`) back from disk.
    pub fn get(&self, rule_id: u64, day: NaiveDate) -> Result<Option<EvaluationReport>, ReportError> {
        if !self.contains(rule_id, day) {
            return Ok(None);
        }

        let matches = |id: u64, d: NaiveDate| id == rule_id && d == day;
        let Some(record) = read_rows::<EvaluationRecord>(&self.evaluations_path())?
            .into_iter()
            .find(|r| matches(r.rule_id, r.execution_day))
        else {
            return Ok(None);
        };
        let vehicles = read_rows::<VehicleReport>(&self.vehicles_path())?
            .into_iter()
            .filter(|v| matches(v.rule_id, v.execution_day))
            .collect();
        let statuses = read_rows::<StatusReport>(&self.statuses_path())?
            .into_iter()
            .filter(|s| matches(s.rule_id, s.execution_day))
            .collect();

        Ok(Some(EvaluationReport {
            record,
            vehicles,
            statuses,
        }))
    }

    fn write(&self, report: &EvaluationReport) -> Result<(), ReportError> {
        if !report.vehicles.is_empty() {
            append_records(self.vehicles_path(), &report.vehicles)?;
        }
        if !report.statuses.is_empty() {
            append_records(self.statuses_path(), &report.statuses)?;
        }
        append_records(self.evaluations_path(), std::slice::from_ref(&report.record))?;
        Ok(())
    }
}

impl ReportStore for CsvReportStore {
    fn contains(&self, rule_id: u64, day: NaiveDate) -> bool {
        self.recorded.contains(&(rule_id, day))
    }

    fn record(&mut self, report: &EvaluationReport) -> Result<(), ReportError> {
        let key = (report.rule_id(), report.execution_day());
        if self.recorded.contains(&key) {
            return Err(ReportError::AlreadyEvaluated {
                rule_id: key.0,
                day: key.1,
            });
        }

        let marks: Vec<(PathBuf, u64)> = [
            self.vehicles_path(),
            self.statuses_path(),
            self.evaluations_path(),
        ]
        .into_iter()
        .map(|path| {
            let len = file_len(&path);
            (path, len)
        })
        .collect();

        if let Err(e) = self.write(report) {
            for (path, len) in &marks {
                if let Err(undo) = truncate_to(path, *len) {
                    warn!(path = %path.display(), error = %undo, "Failed to roll back report rows");
                }
            }
            return Err(e);
        }

        self.recorded.insert(key);
        Ok(())
    }
}

/// All rows of a CSV file; a missing file has none.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ReportError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = csv::Reader::from_reader(File::open(path)?);
    let rows = rdr.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map_or(0, |m| m.len())
}

fn truncate_to(path: &Path, len: u64) -> std::io::Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    OpenOptions::new().write(true).open(path)?.set_len(len)
}
