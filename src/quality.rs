//! ### Quality
//! Lists the suspicious readings of a community's meters. The loader
//! silently drops non-positive consumption; this report says where and why.

use crate::{
    convert::{self, QualityCsvRow},
    error::{AnalysisError, Result},
    series::{CsvSeriesStore, SeriesPoint},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Readings beyond this many watts, with production of the opposite sign,
/// are glitches rather than load.
const SPIKE_WATTS: f64 = 100_000.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    /// Zero (or unreadable) consumption: the meter reported nothing.
    Missing,
    /// Negative consumption equal to the total with no production: the
    /// clamp is mounted backwards.
    ReversedClamp,
    /// Any other negative consumption.
    Negative,
    /// Consumption and production huge and of opposite signs.
    Spike,
    /// Production exactly cancels consumption, leaving a zero total.
    CancelledTotal,
}

impl Anomaly {
    pub fn classify(point: &SeriesPoint) -> Option<Self> {
        let consumption = point.consumption;
        let production = point.production.unwrap_or(0.);
        let spike = (consumption <= -SPIKE_WATTS && production >= SPIKE_WATTS)
            || (consumption >= SPIKE_WATTS && production <= -SPIKE_WATTS);

        if consumption == 0. || consumption.is_nan() {
            Some(Self::Missing)
        } else if consumption < 0. {
            if point.total == Some(consumption) && production == 0. {
                Some(Self::ReversedClamp)
            } else if spike {
                Some(Self::Spike)
            } else {
                Some(Self::Negative)
            }
        } else if spike {
            Some(Self::Spike)
        } else if production < 0. && consumption == -production && point.total == Some(0.) {
            Some(Self::CancelledTotal)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub household_id: String,
    pub timestamp: DateTime<Tz>,
    pub consumption: f64,
    pub anomaly: Anomaly,
}

impl Finding {
    pub fn to_row(&self) -> QualityCsvRow {
        QualityCsvRow {
            household_id: self.household_id.clone(),
            timestamp: convert::format_utc(&self.timestamp.with_timezone(&Utc)),
            consumption: self.consumption,
            anomaly: self.anomaly,
        }
    }
}

/// Anomalies of every household of `community`, households in manifest
/// order and readings in time order. Households without data are skipped.
pub fn check_community(store: &CsvSeriesStore, community: &str) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for household_id in store.households(community) {
        let mut points = match store.raw_points(&household_id) {
            Ok((_, points)) => points,
            Err(e @ AnalysisError::DataUnavailable { .. }) => {
                warn!(community, household = %household_id, error = %e, "skipping household");
                continue;
            }
            Err(e) => return Err(e),
        };
        points.sort_by_key(|point| point.timestamp);

        let before = findings.len();
        findings.extend(points.iter().filter_map(|point| {
            Anomaly::classify(point).map(|anomaly| Finding {
                household_id: household_id.clone(),
                timestamp: point.timestamp,
                consumption: point.consumption,
                anomaly,
            })
        }));
        if findings.len() > before {
            info!(
                community,
                household = %household_id,
                anomalies = findings.len() - before,
                "suspicious readings"
            );
        }
    }
    Ok(findings)
}

pub fn write_report(path: &Path, findings: &[Finding]) -> Result<()> {
    let mut out_csv = csv::Writer::from_path(path)?;
    for finding in findings {
        out_csv.serialize(finding.to_row())?;
    }
    out_csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{convert::ChunkCsvRow, series::MeterKind};
    use chrono::TimeZone;
    use chrono_tz::Europe::Brussels;

    fn point(consumption: f64, production: f64, total: f64) -> SeriesPoint {
        SeriesPoint {
            timestamp: Brussels.with_ymd_and_hms(2023, 3, 7, 18, 0, 0).unwrap(),
            consumption,
            production: Some(production),
            total: Some(total),
        }
    }

    #[test]
    fn classifies_each_case() {
        assert_eq!(Anomaly::classify(&point(0., 0., 0.)), Some(Anomaly::Missing));
        assert_eq!(
            Anomaly::classify(&point(-300., 0., -300.)),
            Some(Anomaly::ReversedClamp)
        );
        assert_eq!(
            Anomaly::classify(&point(-300., 50., -250.)),
            Some(Anomaly::Negative)
        );
        assert_eq!(
            Anomaly::classify(&point(-200_000., 150_000., -50_000.)),
            Some(Anomaly::Spike)
        );
        assert_eq!(
            Anomaly::classify(&point(120_000., -100_000., 20_000.)),
            Some(Anomaly::Spike)
        );
        assert_eq!(
            Anomaly::classify(&point(400., -400., 0.)),
            Some(Anomaly::CancelledTotal)
        );
        assert_eq!(Anomaly::classify(&point(400., -100., 300.)), None);
        assert_eq!(Anomaly::classify(&point(400., 0., 400.)), None);
    }

    #[test]
    fn rtu_readings_without_production() {
        let mut reading = point(-20., 0., 0.);
        reading.production = None;
        reading.total = None;
        assert_eq!(Anomaly::classify(&reading), Some(Anomaly::Negative));
        reading.consumption = f64::NAN;
        assert_eq!(Anomaly::classify(&reading), Some(Anomaly::Missing));
    }

    #[test]
    fn community_report_lists_findings_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h1.csv");
        std::fs::write(
            &path,
            "timestamp,consumption,production,total\n\
             2023-03-07 18:00:00,-80,0,-80\n\
             2023-03-07 17:00:00,0,0,0\n\
             2023-03-07 19:00:00,250,0,250\n",
        )
        .unwrap();
        let chunk = |household: &str, path| ChunkCsvRow {
            household_id: household.to_owned(),
            community: "echo".to_owned(),
            kind: MeterKind::Flukso,
            year: 2023,
            month: 3,
            path,
        };
        let store = CsvSeriesStore::new(
            vec![chunk("h1", path), chunk("h2", dir.path().join("gone.csv"))],
            Brussels,
        );

        let findings = check_community(&store, "echo").unwrap();
        let anomalies: Vec<Anomaly> = findings.iter().map(|f| f.anomaly).collect();
        assert_eq!(anomalies, vec![Anomaly::Missing, Anomaly::ReversedClamp]);
        assert_eq!(findings[1].consumption, -80.);
        assert_eq!(findings[0].to_row().timestamp, "2023-03-07 17:00:00");

        let out = dir.path().join("quality.csv");
        write_report(&out, &findings).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            written.lines().next(),
            Some("household_id,timestamp,consumption,anomaly")
        );
        assert!(written.contains("h1,2023-03-07 18:00:00,-80.0,reversed_clamp"));
    }
}
