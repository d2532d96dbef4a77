//! ### Horizon
//! Report windows around each alert and their place in the score matrix.
//!
//! Every alert owns a block of `2 * horizon_count + 1` columns laid out as
//! `[before_largest, .., before_smallest, alert, after_smallest, .., after_largest]`.

use crate::{
    alerts::{AlertCatalog, Window},
    baseline::BaselineEstimator,
    error::{AnalysisError, Result},
    report::ReportAggregator,
    score::ReactionScorer,
    series::HouseholdSeries,
};
use chrono::TimeDelta;
use tracing::debug;

/// Which window of an alert's block a column holds. `rank` indexes the
/// horizons from smallest (0) to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Before(usize),
    Alert,
    After(usize),
}

/// Configured probe offsets, strictly increasing and positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Horizons {
    offsets: Vec<TimeDelta>,
}

impl Horizons {
    pub fn new(offsets: Vec<TimeDelta>) -> Result<Self> {
        if offsets.iter().any(|offset| *offset <= TimeDelta::zero()) {
            return Err(AnalysisError::config("horizons must be positive"));
        }
        if offsets.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(AnalysisError::config("horizons must be strictly increasing"));
        }
        Ok(Self { offsets })
    }

    pub fn from_hours(hours: &[u32]) -> Result<Self> {
        Self::new(
            hours
                .iter()
                .map(|&hour| TimeDelta::hours(i64::from(hour)))
                .collect(),
        )
    }

    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    pub fn offset(&self, rank: usize) -> TimeDelta {
        self.offsets[rank]
    }

    pub fn columns_per_alert(&self) -> usize {
        2 * self.count() + 1
    }

    pub fn column_count(&self, alert_count: usize) -> usize {
        alert_count * self.columns_per_alert()
    }

    /// `alert_index * 2 * horizon_count + alert_index + horizon_count`
    /// is the alert's own column; horizons sit `rank + 1` either side.
    pub fn column(&self, alert_index: usize, slot: Slot) -> usize {
        let center = alert_index * 2 * self.count() + alert_index + self.count();
        match slot {
            Slot::Before(rank) => center - (rank + 1),
            Slot::Alert => center,
            Slot::After(rank) => center + (rank + 1),
        }
    }

    /// Inverse of [`Self::column`].
    pub fn slot_at(&self, column: usize) -> (usize, Slot) {
        let alert_index = column / self.columns_per_alert();
        let within = column % self.columns_per_alert();
        let slot = match within.cmp(&self.count()) {
            std::cmp::Ordering::Less => Slot::Before(self.count() - within - 1),
            std::cmp::Ordering::Equal => Slot::Alert,
            std::cmp::Ordering::Greater => Slot::After(within - self.count() - 1),
        };
        (alert_index, slot)
    }

    /// Slots of one alert block, in column order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let before = (0..self.count()).rev().map(Slot::Before);
        let after = (0..self.count()).map(Slot::After);
        before.chain(std::iter::once(Slot::Alert)).chain(after)
    }

    /// The window scored for `slot`, always as wide as the alert. "Before"
    /// starts `offset` ahead of the alert start; "after" ends `offset` past
    /// the alert end.
    pub fn window(&self, alert: &Window, slot: Slot) -> Window {
        match slot {
            Slot::Before(rank) => alert.shifted(-self.offset(rank)),
            Slot::Alert => *alert,
            Slot::After(rank) => alert.shifted(self.offset(rank)),
        }
    }

    pub fn tag(&self, slot: Slot) -> String {
        match slot {
            Slot::Before(rank) => format!("-{}h", self.offset(rank).num_hours()),
            Slot::Alert => "alert".to_owned(),
            Slot::After(rank) => format!("+{}h", self.offset(rank).num_hours()),
        }
    }

    /// Human-readable header for every column of a community's matrix,
    /// e.g. `Tue 07 Mar 18h -3h`.
    pub fn column_labels(&self, catalog: &AlertCatalog) -> Vec<String> {
        catalog
            .alerts()
            .iter()
            .flat_map(|alert| {
                let stamp = alert.start.format("%a %d %b %Hh").to_string();
                self.slots()
                    .map(move |slot| format!("{stamp} {}", self.tag(slot)))
            })
            .collect()
    }
}

/// Visits every window of every alert for one household and records the
/// scores.
pub struct HorizonScheduler<'a> {
    horizons: &'a Horizons,
    scorer: ReactionScorer,
}

impl<'a> HorizonScheduler<'a> {
    pub fn new(horizons: &'a Horizons, scorer: ReactionScorer) -> Self {
        Self { horizons, scorer }
    }

    pub fn score_household(
        &self,
        series: &HouseholdSeries,
        catalog: &AlertCatalog,
        household_index: usize,
        aggregator: &mut ReportAggregator,
    ) {
        let estimator = BaselineEstimator::new(series, catalog);
        for (alert_index, alert) in catalog.alerts().iter().enumerate() {
            for slot in self.horizons.slots() {
                let window = self.horizons.window(alert, slot);
                let comparison = estimator.estimate(&window);
                let reaction = self.scorer.score(&comparison);
                debug!(
                    household = series.household_id(),
                    alert_index,
                    slot = %self.horizons.tag(slot),
                    observed = comparison.observed.count(),
                    baseline = comparison.baseline.count(),
                    percent = reaction.percent,
                    "scored window"
                );
                aggregator.record(household_index, alert_index, slot, reaction);
            }
        }
    }
}
