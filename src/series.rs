//! ### Series
//! Loads a household's resampled monthly chunks into one gap-tolerant
//! timeline in the community's local zone.

use crate::{
    convert::{self, ChunkCsvRow, FluksoCsvRow, RtuCsvRow},
    error::{AnalysisError, Result},
};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterKind {
    Flukso,
    Rtu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Tz>,
    /// Watts. Strictly positive once inside a `HouseholdSeries`.
    pub consumption: f64,
    pub production: Option<f64>,
    pub total: Option<f64>,
}

/// Every reading of one household, strictly increasing in time.
#[derive(Debug, Clone)]
pub struct HouseholdSeries {
    household_id: String,
    kind: MeterKind,
    points: Vec<SeriesPoint>,
    defective_readings: usize,
}

impl HouseholdSeries {
    /// Orders the points, keeps the first reading of any repeated timestamp
    /// and drops non-positive consumption, which carries no usable signal.
    pub fn from_points(household_id: &str, kind: MeterKind, mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|point| point.timestamp);
        points.dedup_by_key(|point| point.timestamp);

        let before = points.len();
        // NaN fails the comparison too.
        points.retain(|point| point.consumption > 0.);
        let defective_readings = before - points.len();
        if defective_readings > 0 {
            warn!(
                household = household_id,
                defective_readings, "dropped non-positive consumption readings"
            );
        }

        Self {
            household_id: household_id.to_owned(),
            kind,
            points,
            defective_readings,
        }
    }

    pub fn household_id(&self) -> &str {
        &self.household_id
    }

    pub fn kind(&self) -> MeterKind {
        self.kind
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn defective_readings(&self) -> usize {
        self.defective_readings
    }
}

/// Source of household series. The CSV store is the production one; tests
/// plug in-memory fixtures in here.
pub trait SeriesStore {
    fn load(&self, household_id: &str) -> Result<HouseholdSeries>;
}

/// Reads the monthly chunk files listed in a manifest.
#[derive(Debug, Clone)]
pub struct CsvSeriesStore {
    chunks: Vec<ChunkCsvRow>,
    tz: Tz,
}

impl CsvSeriesStore {
    pub fn new(chunks: Vec<ChunkCsvRow>, tz: Tz) -> Self {
        Self { chunks, tz }
    }

    pub fn from_manifest(manifest: &Path, tz: Tz) -> Result<Self> {
        Ok(Self::new(convert::read_manifest(manifest)?, tz))
    }

    /// Household ids of a community, in first-appearance order.
    pub fn households(&self, community: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for chunk in self.chunks.iter().filter(|chunk| chunk.community == community) {
            if !ids.contains(&chunk.household_id) {
                ids.push(chunk.household_id.clone());
            }
        }
        ids
    }

    fn read_chunk(&self, chunk: &ChunkCsvRow, points: &mut Vec<SeriesPoint>) -> Result<()> {
        if !chunk.path.exists() {
            return Err(AnalysisError::unavailable(
                &chunk.household_id,
                format!(
                    "{}-{:02} chunk {} is missing",
                    chunk.year,
                    chunk.month,
                    chunk.path.display()
                ),
            ));
        }

        let mut reader = csv::Reader::from_path(&chunk.path)?;
        match chunk.kind {
            MeterKind::Flukso => {
                for line in reader.deserialize() {
                    let line: FluksoCsvRow = line?;
                    points.push(SeriesPoint {
                        timestamp: convert::parse_utc(&line.timestamp)?.with_timezone(&self.tz),
                        consumption: line.consumption,
                        production: line.production,
                        total: line.total,
                    });
                }
            }
            MeterKind::Rtu => {
                for line in reader.deserialize() {
                    let line: RtuCsvRow = line?;
                    points.push(SeriesPoint {
                        timestamp: convert::parse_utc(&line.timestamp)?.with_timezone(&self.tz),
                        consumption: line.active_power,
                        production: None,
                        total: None,
                    });
                }
            }
        }
        Ok(())
    }
}

impl CsvSeriesStore {
    /// Every reading of `household_id` as stored, defects included, in
    /// chunk order.
    pub fn raw_points(&self, household_id: &str) -> Result<(MeterKind, Vec<SeriesPoint>)> {
        let mut chunks: Vec<&ChunkCsvRow> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.household_id == household_id)
            .collect();
        let Some(first) = chunks.first() else {
            return Err(AnalysisError::unavailable(household_id, "no chunk in manifest"));
        };
        let kind = first.kind;
        if chunks.iter().any(|chunk| chunk.kind != kind) {
            return Err(AnalysisError::config(format!(
                "household {household_id} mixes flukso and rtu chunks"
            )));
        }
        chunks.sort_by_key(|chunk| (chunk.year, chunk.month));

        let mut points = Vec::new();
        for chunk in chunks {
            self.read_chunk(chunk, &mut points)?;
        }
        debug!(household = household_id, points = points.len(), "loaded chunks");
        Ok((kind, points))
    }
}

impl SeriesStore for CsvSeriesStore {
    fn load(&self, household_id: &str) -> Result<HouseholdSeries> {
        let (kind, points) = self.raw_points(household_id)?;
        Ok(HouseholdSeries::from_points(household_id, kind, points))
    }
}
