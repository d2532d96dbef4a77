//! ### Convert
//! CSV formats exchanged with the ingestion and export sides of the
//! pipeline: resampled meter chunks, the chunk manifest, alert tables and
//! the score report.

use crate::{
    alerts::{AlertCatalog, Window},
    error::{AnalysisError, Result},
    quality::Anomaly,
    report::ScoreReport,
    series::MeterKind,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// First column of the report's closing roll-up row.
pub const BILAN: &str = "Bilan";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluksoCsvRow {
    pub timestamp: String,
    pub consumption: f64,
    pub production: Option<f64>,
    pub total: Option<f64>,
}

/// Low-voltage cabin feed. Active power is the consumption signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtuCsvRow {
    pub timestamp: String,
    pub active_power: f64,
}

/// One monthly file of one household, as listed in the chunk manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCsvRow {
    pub household_id: String,
    pub community: String,
    pub kind: MeterKind,
    pub year: i32,
    pub month: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCsvRow {
    pub start: String,
    pub end: String,
}

/// One suspicious reading. Timestamps are written back in UTC, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityCsvRow {
    pub household_id: String,
    pub timestamp: String,
    pub consumption: f64,
    pub anomaly: Anomaly,
}

/// Meter exports are stored in UTC, either RFC 3339 or a bare
/// `%Y-%m-%d %H:%M:%S`.
pub fn parse_utc(timestamp: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(parsed.with_timezone(&Utc));
    }
    Ok(NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)?.and_utc())
}

pub fn format_utc(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Alert tables are written in local wall-clock time. Instants that the
/// zone skips or repeats (DST switches) are refused rather than guessed.
pub fn parse_local(timestamp: &str, tz: &Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)?;
    tz.from_local_datetime(&naive).single().ok_or_else(|| {
        AnalysisError::config(format!(
            "local time {timestamp} is ambiguous or does not exist in {tz}"
        ))
    })
}

/// Reads the chunk manifest. Relative chunk paths resolve against the
/// manifest's own directory.
pub fn read_manifest(path: &Path) -> Result<Vec<ChunkCsvRow>> {
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        let mut row: ChunkCsvRow = row?;
        if !(1..=12).contains(&row.month) {
            return Err(AnalysisError::config(format!(
                "manifest entry for {} has month {}",
                row.household_id, row.month
            )));
        }
        if row.path.is_relative() {
            row.path = base.join(&row.path);
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_alerts(path: &Path, community: &str, tz: &Tz) -> Result<AlertCatalog> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut windows = Vec::new();
    for row in reader.deserialize() {
        let row: AlertCsvRow = row?;
        windows.push(Window::new(
            parse_local(&row.start, tz)?,
            parse_local(&row.end, tz)?,
        )?);
    }
    AlertCatalog::new(community, windows)
}

/// Writes the score matrix with one labelled column per (alert, horizon)
/// slot, followed by the `Bilan` row of summed energy deltas. Floats use
/// the shortest representation that parses back to the same `f64`.
pub fn write_score_report(path: &Path, labels: &[String], report: &ScoreReport) -> Result<()> {
    if labels.len() != report.sums.len() {
        return Err(AnalysisError::config(format!(
            "{} labels for {} report columns",
            labels.len(),
            report.sums.len()
        )));
    }

    let mut out_csv = csv::Writer::from_path(path)?;
    out_csv.write_record(std::iter::once("household").chain(labels.iter().map(String::as_str)))?;
    for (household, row) in report.households.iter().zip(&report.matrix) {
        out_csv.write_record(
            std::iter::once(household.clone()).chain(row.iter().map(|val| val.to_string())),
        )?;
    }
    out_csv.write_record(
        std::iter::once(BILAN.to_owned()).chain(report.sums.iter().map(|val| val.to_string())),
    )?;
    out_csv.flush()?;
    Ok(())
}

/// Inverse of [`write_score_report`]: returns the column labels and the report.
pub fn read_score_report(path: &Path) -> Result<(Vec<String>, ScoreReport)> {
    let mut reader = csv::Reader::from_path(path)?;
    let labels: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_owned).collect();

    let mut report = ScoreReport::default();
    let mut saw_bilan = false;
    for record in reader.records() {
        let record = record?;
        let Some(name) = record.get(0) else {
            continue;
        };
        let values = record
            .iter()
            .skip(1)
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|e| AnalysisError::config(format!("bad report cell {cell:?}: {e}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != labels.len() {
            return Err(AnalysisError::config(format!(
                "report row {name} has {} cells, expected {}",
                values.len(),
                labels.len()
            )));
        }
        if name == BILAN {
            report.sums = values;
            saw_bilan = true;
        } else {
            report.households.push(name.to_owned());
            report.matrix.push(values);
        }
    }

    if !saw_bilan {
        return Err(AnalysisError::config(format!(
            "{} has no {BILAN} row",
            path.display()
        )));
    }
    Ok((labels, report))
}
