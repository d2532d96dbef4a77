//! ### Baseline
//! Estimates what a household would have consumed during a window absent
//! any alert, from the same weekday and time of day on other weeks.

use crate::{alerts::AlertCatalog, alerts::Window, series::HouseholdSeries};
use chrono::{Datelike, TimeDelta, Timelike};

/// Running sum and sample count of consumption readings.
///
/// The sum is compensated (Neumaier) and the extremes are tracked, so a
/// population of identical readings has exactly that reading as its mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    sum: f64,
    compensation: f64,
    count: usize,
    min: f64,
    max: f64,
}

impl Default for Aggregate {
    fn default() -> Self {
        Self {
            sum: 0.,
            compensation: 0.,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Aggregate {
    pub fn push(&mut self, value: f64) {
        self.add(value);
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn add(&mut self, value: f64) {
        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
    }

    pub fn sum(&self) -> f64 {
        self.sum + self.compensation
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` when nothing was sampled.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        if self.min == self.max {
            return Some(self.min);
        }
        Some(self.sum() / self.count as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Both populations as one.
    pub fn merged(&self, other: &Aggregate) -> Aggregate {
        let mut merged = *self;
        merged.add(other.sum);
        merged.add(other.compensation);
        merged.count += other.count;
        merged.min = merged.min.min(other.min);
        merged.max = merged.max.max(other.max);
        merged
    }
}

/// Readings of the target window next to its baseline population.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Comparison {
    /// The window itself, on its own calendar day.
    pub observed: Aggregate,
    /// Same weekday and time slice on every other day, outside all alerts.
    pub baseline: Aggregate,
}

impl Comparison {
    /// Weighted mean over both populations. Scores are expressed relative to
    /// this so they reflect the household's own typical level.
    pub fn global_mean(&self) -> Option<f64> {
        self.observed.merged(&self.baseline).mean()
    }
}

pub struct BaselineEstimator<'a> {
    series: &'a HouseholdSeries,
    alerts: &'a AlertCatalog,
}

impl<'a> BaselineEstimator<'a> {
    pub fn new(series: &'a HouseholdSeries, alerts: &'a AlertCatalog) -> Self {
        Self { series, alerts }
    }

    /// Splits the series' readings matching `window`'s weekday and time of
    /// day into the window's own day and the baseline population.
    ///
    /// A reading matches when moving it back by the window's start time of
    /// day lands it on the window's weekday, less than the window's width
    /// past midnight. For a window inside one day that is plain "same
    /// weekday, time in `[start.time(), end.time())`"; the shift also lets
    /// windows running past midnight keep their slice contiguous.
    ///
    /// The width is taken on the wall clock, so a window spanning a DST
    /// change still selects the same local hours on every other week.
    pub fn estimate(&self, window: &Window) -> Comparison {
        let start = window.start.naive_local();
        let anchor = TimeDelta::seconds(i64::from(start.time().num_seconds_from_midnight()));
        let width = window.end.naive_local() - start;
        let weekday = start.weekday();
        let own_day = start.date();

        let mut comparison = Comparison::default();
        for point in self.series.points() {
            let shifted = point.timestamp.naive_local() - anchor;
            if shifted.weekday() != weekday {
                continue;
            }
            let past_midnight =
                TimeDelta::seconds(i64::from(shifted.time().num_seconds_from_midnight()));
            if past_midnight >= width {
                continue;
            }

            if shifted.date() == own_day {
                comparison.observed.push(point.consumption);
            } else if !self.alerts.covers(&point.timestamp) {
                comparison.baseline.push(point.consumption);
            }
        }
        comparison
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{MeterKind, SeriesPoint};
    use chrono::{DateTime, TimeZone};
    use chrono_tz::{Europe::Brussels, Tz};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        Brussels.with_ymd_and_hms(2023, 3, day, hour, minute, 0).unwrap()
    }

    /// 15-minute readings for every day of March 2023 from `value(day, hour)`.
    fn march(value: impl Fn(u32, u32) -> f64) -> HouseholdSeries {
        let mut points = Vec::new();
        for day in 1..=31 {
            for hour in 0..24 {
                for minute in [0, 15, 30, 45] {
                    // 02:xx on the 26th is skipped by DST.
                    let Some(timestamp) = Brussels
                        .with_ymd_and_hms(2023, 3, day, hour, minute, 0)
                        .single()
                    else {
                        continue;
                    };
                    points.push(SeriesPoint {
                        timestamp,
                        consumption: value(day, hour),
                        production: None,
                        total: None,
                    });
                }
            }
        }
        HouseholdSeries::from_points("h1", MeterKind::Flukso, points)
    }

    fn alerts(windows: &[(u32, u32, u32)]) -> AlertCatalog {
        AlertCatalog::new(
            "echo",
            windows
                .iter()
                .map(|&(day, from, to)| Window::new(at(day, from, 0), at(day, to, 0)).unwrap())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn mean_of_empty_aggregate_is_none() {
        assert_eq!(Aggregate::default().mean(), None);
        assert_eq!(Comparison::default().global_mean(), None);
    }

    #[test]
    fn identical_readings_average_to_themselves() {
        for value in [0.1, 123.4, 7.3] {
            let mut observed = Aggregate::default();
            let mut baseline = Aggregate::default();
            (0..8).for_each(|_| observed.push(value));
            (0..24).for_each(|_| baseline.push(value));
            assert_eq!(observed.mean(), Some(value));
            assert_eq!(baseline.mean(), Some(value));
            let cmp = Comparison { observed, baseline };
            assert_eq!(cmp.global_mean(), Some(value));
        }
    }

    #[test]
    fn compensated_sum_keeps_small_readings() {
        let mut agg = Aggregate::default();
        agg.push(1e16);
        agg.push(1.);
        agg.push(-1e16);
        assert_eq!(agg.sum(), 1.);
        assert_eq!(agg.count(), 3);
    }

    #[test]
    fn tuesday_evening_scenario() {
        // Baseline Tuesdays in March 2023 are the 7th, 14th and 21st; the 28th
        // is the alert. One reading per Tuesday in the baseline, four during
        // the alert.
        let mut points = Vec::new();
        for day in [7, 14, 21] {
            points.push(SeriesPoint {
                timestamp: at(day, 18, 30),
                consumption: 100.,
                production: None,
                total: None,
            });
        }
        for minute in [0, 15, 30, 45] {
            points.push(SeriesPoint {
                timestamp: at(28, 18, minute),
                consumption: 40.,
                production: None,
                total: None,
            });
        }
        let series = HouseholdSeries::from_points("h", MeterKind::Flukso, points);
        let catalog = alerts(&[(28, 18, 20)]);

        let cmp = BaselineEstimator::new(&series, &catalog).estimate(&catalog.alerts()[0]);
        assert_eq!(cmp.baseline.mean(), Some(100.));
        assert_eq!(cmp.baseline.count(), 3);
        assert_eq!(cmp.observed.mean(), Some(40.));
        let global = cmp.global_mean().unwrap();
        assert!((global - 460. / 7.).abs() < 1e-9);
    }

    #[test]
    fn baseline_never_includes_alert_readings() {
        // Alert readings are poisoned with a huge value; none may leak into
        // the baseline of any other alert.
        let catalog = alerts(&[(7, 18, 20), (14, 18, 20), (21, 19, 21)]);
        let series = march(|day, hour| {
            let instant = at(day, hour, 0);
            if catalog.covers(&instant) {
                1e9
            } else {
                100.
            }
        });

        let estimator = BaselineEstimator::new(&series, &catalog);
        for alert in catalog.alerts() {
            let cmp = estimator.estimate(alert);
            assert!(cmp.baseline.count() > 0);
            assert_eq!(cmp.baseline.mean(), Some(100.));
        }
    }

    #[test]
    fn only_same_weekday_and_time_slice_contribute() {
        // Encode weekday and hour into the reading so the baseline sum tells
        // us exactly which rows were picked.
        let series = march(|day, hour| f64::from(day * 100 + hour + 1));
        let catalog = alerts(&[(14, 18, 20)]);
        let cmp = BaselineEstimator::new(&series, &catalog).estimate(&catalog.alerts()[0]);

        // Other Tuesdays: 7, 21, 28. Hours 18 and 19, four readings each.
        let expected: f64 = [7u32, 21, 28]
            .iter()
            .flat_map(|day| [18u32, 19].map(move |hour| f64::from(day * 100 + hour + 1) * 4.))
            .sum();
        assert_eq!(cmp.baseline.count(), 3 * 2 * 4);
        assert_eq!(cmp.baseline.sum(), expected);
        assert_eq!(cmp.observed.count(), 8);
        assert_eq!(cmp.observed.sum(), (1419. + 1420.) * 4.);
    }

    #[test]
    fn window_past_midnight_stays_contiguous() {
        let series = march(|_, _| 50.);
        let catalog = alerts(&[]);
        // Tuesday 23:00 to Wednesday 01:00.
        let window = Window::new(at(14, 23, 0), at(15, 1, 0)).unwrap();
        let cmp = BaselineEstimator::new(&series, &catalog).estimate(&window);

        assert_eq!(cmp.observed.count(), 8);
        // Full slices for Tuesdays 7, 21 and 28 (the last runs into the
        // 29th), plus the half of Feb 28's slice that falls on Mar 1.
        assert_eq!(cmp.baseline.count(), 3 * 8 + 4);
    }

    #[test]
    fn empty_baseline_reports_zero_count() {
        // Series holds only the alert day itself.
        let series = march(|_, _| 80.);
        let only_day: Vec<SeriesPoint> = series
            .points()
            .iter()
            .filter(|p| p.timestamp.naive_local().date() == at(7, 0, 0).naive_local().date())
            .copied()
            .collect();
        let series = HouseholdSeries::from_points("h", MeterKind::Flukso, only_day);
        let catalog = alerts(&[(7, 18, 20)]);

        let cmp = BaselineEstimator::new(&series, &catalog).estimate(&catalog.alerts()[0]);
        assert!(cmp.baseline.is_empty());
        assert_eq!(cmp.baseline.mean(), None);
        assert_eq!(cmp.observed.count(), 8);
    }
}
