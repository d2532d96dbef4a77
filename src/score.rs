//! ### Score
//! Turns a window/baseline comparison into a percentage reduction and an
//! energy delta.

use crate::{
    baseline::Comparison,
    error::{AnalysisError, Result},
};
use chrono::TimeDelta;

/// Sampling interval of a resampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    minutes: u32,
}

impl Cadence {
    const MINS_PER_HOUR: u32 = 60;
    const WATTS_PER_KW: f64 = 1000.;

    /// The interval must split an hour evenly so every sample stands for the
    /// same fraction of an hour.
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes == 0 || Self::MINS_PER_HOUR % minutes != 0 {
            return Err(AnalysisError::config(format!(
                "sample interval of {minutes} min does not divide an hour"
            )));
        }
        Ok(Self { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.minutes))
    }

    pub fn samples_per_hour(&self) -> u32 {
        Self::MINS_PER_HOUR / self.minutes
    }

    /// Each watt reading covers `1 / samples_per_hour` hours, so a sum of
    /// readings divided by `1000 * samples_per_hour` is kWh.
    /// 15 min gives 4000, hourly data gives 1000.
    pub fn kwh_divisor(&self) -> f64 {
        Self::WATTS_PER_KW * f64::from(self.samples_per_hour())
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self { minutes: 15 }
    }
}

/// Score of one household for one window.
///
/// Both fields are "during minus baseline": negative means the household
/// consumed less than usual.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reaction {
    pub percent: f64,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReactionScorer {
    cadence: Cadence,
}

impl ReactionScorer {
    pub fn new(cadence: Cadence) -> Self {
        Self { cadence }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// An empty side, or any non-positive mean, scores zero.
    pub fn score(&self, comparison: &Comparison) -> Reaction {
        let (Some(observed), Some(baseline), Some(global)) = (
            comparison.observed.mean(),
            comparison.baseline.mean(),
            comparison.global_mean(),
        ) else {
            return Reaction::default();
        };
        if observed <= 0. || baseline <= 0. || global <= 0. {
            return Reaction::default();
        }

        // Observed sum minus the baseline mean over as many samples. Taken
        // from the mean difference so equal means give exactly zero.
        let delta = observed - baseline;
        Reaction {
            percent: delta / global * 100.,
            energy_kwh: delta * comparison.observed.count() as f64 / self.cadence.kwh_divisor(),
        }
    }
}
