//! ### Report
//! Collects every household's scores for one community.

use crate::{
    horizon::{Horizons, Slot},
    score::Reaction,
};
use std::collections::HashMap;

/// Final product of one community run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    /// Row labels, in first-seen order.
    pub households: Vec<String>,
    /// Percentage reductions, one row per household.
    pub matrix: Vec<Vec<f64>>,
    /// Energy deltas in kWh summed over households, one per column (the Bilan).
    pub sums: Vec<f64>,
}

impl ScoreReport {
    /// Counts, per alert and per household, who reacted. A household reacted
    /// to an alert when its score in the alert's own column is negative,
    /// i.e. it consumed below its own typical level.
    pub fn ranking(&self, horizons: &Horizons) -> ReactionRanking {
        let alert_count = self.sums.len() / horizons.columns_per_alert();
        let mut per_alert = vec![0; alert_count];
        let mut households: Vec<HouseholdReactions> = self
            .households
            .iter()
            .zip(&self.matrix)
            .map(|(household, row)| {
                let alerts: Vec<usize> = (0..alert_count)
                    .filter(|&alert| row[horizons.column(alert, Slot::Alert)] < 0.)
                    .collect();
                alerts.iter().for_each(|&alert| per_alert[alert] += 1);
                HouseholdReactions {
                    household: household.clone(),
                    alerts,
                }
            })
            .collect();
        // Stable: ties keep row order.
        households.sort_by(|a, b| b.alerts.len().cmp(&a.alerts.len()));

        ReactionRanking {
            alert_count,
            per_alert,
            households,
        }
    }
}

/// Who reacted to which alert.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRanking {
    pub alert_count: usize,
    /// Reacting households, indexed by alert.
    pub per_alert: Vec<usize>,
    /// Most reactive household first.
    pub households: Vec<HouseholdReactions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HouseholdReactions {
    pub household: String,
    /// Indices of the alerts reacted to, ascending.
    pub alerts: Vec<usize>,
}

impl ReactionRanking {
    /// Alert indices, most reactions first.
    pub fn alerts_by_reactions(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.alert_count).collect();
        order.sort_by(|a, b| self.per_alert[*b].cmp(&self.per_alert[*a]));
        order
    }

    /// Share of all alerts `reactions` answered, in percent.
    pub fn share(&self, reactions: &HouseholdReactions) -> f64 {
        if self.alert_count == 0 {
            return 0.;
        }
        reactions.alerts.len() as f64 / self.alert_count as f64 * 100.
    }
}

/// Owns the matrix and roll-up while a community is processed. A fresh
/// aggregator is built per community run.
#[derive(Debug)]
pub struct ReportAggregator {
    horizons: Horizons,
    columns: usize,
    households: Vec<String>,
    rows: HashMap<String, usize>,
    matrix: Vec<Vec<f64>>,
    written: Vec<Vec<bool>>,
    sums: Vec<f64>,
}

impl ReportAggregator {
    pub fn new(horizons: Horizons, alert_count: usize) -> Self {
        let columns = horizons.column_count(alert_count);
        Self {
            horizons,
            columns,
            households: Vec::new(),
            rows: HashMap::new(),
            matrix: Vec::new(),
            written: Vec::new(),
            sums: vec![0.; columns],
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Row index of `household_id`, handing out the next one the first time
    /// an id is seen.
    pub fn register_household(&mut self, household_id: &str) -> usize {
        if let Some(&row) = self.rows.get(household_id) {
            return row;
        }
        let row = self.households.len();
        self.households.push(household_id.to_owned());
        self.rows.insert(household_id.to_owned(), row);
        self.matrix.push(vec![0.; self.columns]);
        self.written.push(vec![false; self.columns]);
        row
    }

    /// Stores one score. Each cell is written at most once per household;
    /// a second write is a caller bug.
    pub fn record(
        &mut self,
        household_index: usize,
        alert_index: usize,
        slot: Slot,
        reaction: Reaction,
    ) {
        let column = self.horizons.column(alert_index, slot);
        debug_assert!(
            !self.written[household_index][column],
            "cell ({household_index}, {column}) written twice"
        );
        self.written[household_index][column] = true;
        self.matrix[household_index][column] = reaction.percent;
        self.sums[column] += reaction.energy_kwh;
    }

    pub fn finalize(self) -> ScoreReport {
        ScoreReport {
            households: self.households,
            matrix: self.matrix,
            sums: self.sums,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(alerts: usize) -> ReportAggregator {
        ReportAggregator::new(Horizons::from_hours(&[3, 6, 12]).unwrap(), alerts)
    }

    #[test]
    fn rows_follow_first_seen_order() {
        let mut agg = aggregator(1);
        assert_eq!(agg.register_household("h7"), 0);
        assert_eq!(agg.register_household("h2"), 1);
        assert_eq!(agg.register_household("h7"), 0);
        assert_eq!(agg.register_household("h5"), 2);

        let report = agg.finalize();
        assert_eq!(report.households, vec!["h7", "h2", "h5"]);
        assert_eq!(report.matrix.len(), 3);
    }

    #[test]
    fn records_land_in_layout_column() {
        let mut agg = aggregator(2);
        assert_eq!(agg.columns(), 14);
        let row = agg.register_household("h1");
        agg.record(
            row,
            1,
            Slot::Alert,
            Reaction {
                percent: -25.,
                energy_kwh: -0.5,
            },
        );
        agg.record(
            row,
            1,
            Slot::Before(0),
            Reaction {
                percent: 4.,
                energy_kwh: 0.1,
            },
        );

        let report = agg.finalize();
        assert_eq!(report.matrix[0][10], -25.);
        assert_eq!(report.matrix[0][9], 4.);
        assert_eq!(report.sums[10], -0.5);
        assert_eq!(report.sums[9], 0.1);
        assert_eq!(report.sums.iter().filter(|v| **v != 0.).count(), 2);
    }

    #[test]
    fn bilan_sums_across_households() {
        let mut agg = aggregator(1);
        for (id, kwh) in [("h1", -1.25), ("h2", -0.5), ("h3", 0.25)] {
            let row = agg.register_household(id);
            agg.record(
                row,
                0,
                Slot::After(2),
                Reaction {
                    percent: 0.,
                    energy_kwh: kwh,
                },
            );
        }
        let report = agg.finalize();
        assert_eq!(report.sums[6], -1.5);
    }

    #[test]
    fn ranking_counts_negative_alert_cells() {
        let horizons = Horizons::from_hours(&[3, 6, 12]).unwrap();
        let mut agg = ReportAggregator::new(horizons.clone(), 3);
        let reduced = Reaction {
            percent: -12.,
            energy_kwh: -0.2,
        };
        let raised = Reaction {
            percent: 8.,
            energy_kwh: 0.1,
        };
        // h1 reacts to alert 2 only, plus a reduction outside any alert.
        let h1 = agg.register_household("h1");
        agg.record(h1, 2, Slot::Alert, reduced);
        agg.record(h1, 0, Slot::After(0), reduced);
        // h2 reacts to alerts 0 and 2, not to 1.
        let h2 = agg.register_household("h2");
        agg.record(h2, 0, Slot::Alert, reduced);
        agg.record(h2, 1, Slot::Alert, raised);
        agg.record(h2, 2, Slot::Alert, reduced);
        // h3 never reacts.
        agg.register_household("h3");

        let ranking = agg.finalize().ranking(&horizons);
        assert_eq!(ranking.alert_count, 3);
        assert_eq!(ranking.per_alert, vec![1, 0, 2]);
        assert_eq!(ranking.alerts_by_reactions(), vec![2, 0, 1]);

        let order: Vec<&str> = ranking
            .households
            .iter()
            .map(|h| h.household.as_str())
            .collect();
        assert_eq!(order, vec!["h2", "h1", "h3"]);
        assert_eq!(ranking.households[0].alerts, vec![0, 2]);
        assert_eq!(ranking.households[1].alerts, vec![2]);
        assert!((ranking.share(&ranking.households[0]) - 200. / 3.).abs() < 1e-9);
        assert_eq!(ranking.share(&ranking.households[2]), 0.);
    }

    #[test]
    fn ranking_of_empty_report() {
        let ranking = ScoreReport::default().ranking(&Horizons::from_hours(&[3]).unwrap());
        assert_eq!(ranking.alert_count, 0);
        assert!(ranking.households.is_empty());
        assert!(ranking.alerts_by_reactions().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "written twice")]
    fn double_write_is_caught_in_debug() {
        let mut agg = aggregator(1);
        let row = agg.register_household("h1");
        agg.record(row, 0, Slot::Alert, Reaction::default());
        agg.record(row, 0, Slot::Alert, Reaction::default());
    }
}
