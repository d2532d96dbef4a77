//! ### Pipeline
//! Runs every household of a community through the scheduler, one at a
//! time, so row order matches processing order.

use crate::{
    alerts::AlertCatalog,
    config::AnalysisConfig,
    convert,
    error::{AnalysisError, Result},
    horizon::{HorizonScheduler, Horizons},
    report::{ReactionRanking, ReportAggregator, ScoreReport},
    score::{Cadence, ReactionScorer},
    series::{CsvSeriesStore, SeriesStore},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Scores `households` against `catalog`. A household without usable data
/// is left out of the matrix and the rest of the community still runs; any
/// other failure, such as a misconfigured manifest, aborts the community.
pub fn score_community(
    store: &impl SeriesStore,
    households: &[String],
    catalog: &AlertCatalog,
    horizons: &Horizons,
    cadence: Cadence,
) -> Result<ScoreReport> {
    let scheduler = HorizonScheduler::new(horizons, ReactionScorer::new(cadence));
    let mut aggregator = ReportAggregator::new(horizons.clone(), catalog.len());

    for household_id in households {
        let series = match store.load(household_id) {
            Ok(series) => series,
            Err(e @ AnalysisError::DataUnavailable { .. }) => {
                warn!(
                    community = catalog.community(),
                    household = %household_id,
                    error = %e,
                    "skipping household"
                );
                continue;
            }
            Err(e) => return Err(e),
        };
        if series.is_empty() {
            warn!(
                community = catalog.community(),
                household = %household_id,
                "skipping: no usable readings"
            );
            continue;
        }

        let row = aggregator.register_household(household_id);
        scheduler.score_household(&series, catalog, row, &mut aggregator);
        info!(
            community = catalog.community(),
            household = %household_id,
            row,
            points = series.len(),
            "household scored"
        );
    }

    Ok(aggregator.finalize())
}

/// Outcome of [`run_community`].
#[derive(Debug)]
pub struct CommunityRun {
    pub report_path: PathBuf,
    pub catalog: AlertCatalog,
    pub ranking: ReactionRanking,
}

/// Runs one configured community end to end and writes
/// `<out_dir>/<community>_scores.csv`.
pub fn run_community(
    config: &AnalysisConfig,
    store: &CsvSeriesStore,
    community: &str,
    out_dir: &Path,
) -> Result<CommunityRun> {
    let tz = config.tz()?;
    let horizons = config.horizons()?;
    let cadence = config.cadence()?;
    let Some(community_config) = config.communities.iter().find(|c| c.name == community) else {
        return Err(AnalysisError::config(format!(
            "community {community} is not configured"
        )));
    };

    let catalog = convert::read_alerts(&community_config.alerts, community, &tz)?;
    let households = store.households(community);
    info!(
        community,
        alerts = catalog.len(),
        households = households.len(),
        "scoring community"
    );

    let report = score_community(store, &households, &catalog, &horizons, cadence)?;
    let labels = horizons.column_labels(&catalog);
    let out_path = out_dir.join(format!("{community}_scores.csv"));
    convert::write_score_report(&out_path, &labels, &report)?;
    info!(
        community,
        rows = report.households.len(),
        path = %out_path.display(),
        "report written"
    );
    Ok(CommunityRun {
        report_path: out_path,
        ranking: report.ranking(&horizons),
        catalog,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::Window,
        horizon::Slot,
        series::{HouseholdSeries, MeterKind, SeriesPoint},
    };
    use chrono::{DateTime, TimeDelta, TimeZone};
    use chrono_tz::{Europe::Brussels, Tz};
    use std::collections::HashMap;

    struct MemoryStore(HashMap<String, HouseholdSeries>);

    impl SeriesStore for MemoryStore {
        fn load(&self, household_id: &str) -> Result<HouseholdSeries> {
            self.0
                .get(household_id)
                .cloned()
                .ok_or_else(|| AnalysisError::unavailable(household_id, "not in fixture"))
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Tz> {
        Brussels.with_ymd_and_hms(2023, 3, day, hour, 0, 0).unwrap()
    }

    /// Hourly readings over Mar 1-21 from `value`.
    fn series(id: &str, value: impl Fn(&DateTime<Tz>) -> f64) -> HouseholdSeries {
        let start = at(1, 0);
        let points = (0..21 * 24)
            .map(|hour| {
                let timestamp = start + TimeDelta::hours(hour);
                SeriesPoint {
                    timestamp,
                    consumption: value(&timestamp),
                    production: None,
                    total: None,
                }
            })
            .collect();
        HouseholdSeries::from_points(id, MeterKind::Flukso, points)
    }

    fn catalog() -> AlertCatalog {
        AlertCatalog::new(
            "echo",
            vec![
                Window::new(at(7, 18), at(7, 20)).unwrap(),
                Window::new(at(14, 18), at(14, 20)).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn constant_household_scores_zero_everywhere() {
        let store = MemoryStore(HashMap::from([(
            "flat".to_owned(),
            series("flat", |_| 250.),
        )]));
        let horizons = Horizons::from_hours(&[3, 6, 12]).unwrap();
        let report = score_community(
            &store,
            &["flat".to_owned()],
            &catalog(),
            &horizons,
            Cadence::from_minutes(60).unwrap(),
        )
        .unwrap();

        assert_eq!(report.matrix.len(), 1);
        assert_eq!(report.matrix[0].len(), 14);
        assert!(report.matrix[0].iter().all(|v| *v == 0.));
        assert!(report.sums.iter().all(|v| *v == 0.));
    }

    #[test]
    fn missing_household_leaves_no_row() {
        let catalog = catalog();
        let store = MemoryStore(HashMap::from([
            ("h1".to_owned(), series("h1", |_| 100.)),
            (
                "h3".to_owned(),
                series("h3", |ts| if catalog.covers(ts) { 50. } else { 100. }),
            ),
        ]));
        let horizons = Horizons::from_hours(&[3]).unwrap();
        let households: Vec<String> = ["h1", "h2", "h3"].iter().map(|s| s.to_string()).collect();
        let report = score_community(
            &store,
            &households,
            &catalog,
            &horizons,
            Cadence::from_minutes(60).unwrap(),
        )
        .unwrap();

        assert_eq!(report.households, vec!["h1", "h3"]);
        let alert_col = horizons.column(0, Slot::Alert);
        assert_eq!(report.matrix[0][alert_col], 0.);
        assert!(report.matrix[1][alert_col] < 0.);
        // Two hourly readings 50 W below a 100 W baseline: 0.1 kWh saved.
        assert!((report.sums[alert_col] - -0.1).abs() < 1e-12);
        // Horizon windows of h3 are outside any alert.
        assert_eq!(report.matrix[1][horizons.column(0, Slot::Before(0))], 0.);
    }

    struct BrokenStore;

    impl SeriesStore for BrokenStore {
        fn load(&self, household_id: &str) -> Result<HouseholdSeries> {
            Err(AnalysisError::config(format!(
                "{household_id} has chunks of different meter kinds"
            )))
        }
    }

    #[test]
    fn configuration_error_aborts_the_community() {
        let result = score_community(
            &BrokenStore,
            &["h1".to_owned()],
            &catalog(),
            &Horizons::from_hours(&[3]).unwrap(),
            Cadence::from_minutes(60).unwrap(),
        );
        assert!(matches!(result, Err(AnalysisError::Configuration(_))));
    }

    #[test]
    fn readings_with_inexact_sums_still_score_zero() {
        let horizons = Horizons::from_hours(&[3, 6, 12]).unwrap();
        for value in [0.1, 123.4, 7.3] {
            let store = MemoryStore(HashMap::from([(
                "flat".to_owned(),
                series("flat", |_| value),
            )]));
            let report = score_community(
                &store,
                &["flat".to_owned()],
                &catalog(),
                &horizons,
                Cadence::from_minutes(60).unwrap(),
            )
            .unwrap();
            assert!(report.matrix[0].iter().all(|v| *v == 0.), "{value}");
            assert!(report.sums.iter().all(|v| *v == 0.), "{value}");
        }
    }
}
