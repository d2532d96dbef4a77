//! ### Alerts
//! The announced demand-response windows of one community.

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;

/// A half-open `[start, end)` interval in the community's local zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Window {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        if end <= start {
            return Err(AnalysisError::config(format!(
                "window end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, instant: &DateTime<Tz>) -> bool {
        self.start <= *instant && *instant < self.end
    }

    /// Moved by `offset` on the wall clock (negative moves earlier), so a
    /// 18:00 window shifted by 12h starts at 06:00 local even across a DST
    /// change.
    pub fn shifted(&self, offset: TimeDelta) -> Self {
        Self {
            start: wall_clock_add(&self.start, offset),
            end: wall_clock_add(&self.end, offset),
        }
    }
}

/// Local time `offset` later. A result in a fall-back overlap takes the
/// earlier instant; one in a spring-forward gap falls back to the absolute
/// shift.
fn wall_clock_add(instant: &DateTime<Tz>, offset: TimeDelta) -> DateTime<Tz> {
    let local = instant.naive_local() + offset;
    instant
        .timezone()
        .from_local_datetime(&local)
        .earliest()
        .unwrap_or(*instant + offset)
}

/// Alerts of one community, sorted by start and free of overlaps.
#[derive(Debug, Clone)]
pub struct AlertCatalog {
    community: String,
    alerts: Vec<Window>,
}

impl AlertCatalog {
    /// Windows longer than a day can't be matched against a time-of-day
    /// slice, so they are rejected with the other malformed inputs.
    pub fn new(community: &str, mut alerts: Vec<Window>) -> Result<Self> {
        alerts.sort_by_key(|alert| alert.start);

        for alert in &alerts {
            if alert.end <= alert.start {
                return Err(AnalysisError::config(format!(
                    "{community}: alert starting {} has end <= start",
                    alert.start
                )));
            }
            if alert.duration() > TimeDelta::days(1) {
                return Err(AnalysisError::config(format!(
                    "{community}: alert starting {} lasts longer than a day",
                    alert.start
                )));
            }
        }
        for pair in alerts.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(AnalysisError::config(format!(
                    "{community}: alert starting {} overlaps alert starting {}",
                    pair[1].start, pair[0].start
                )));
            }
        }

        Ok(Self {
            community: community.to_owned(),
            alerts,
        })
    }

    pub fn community(&self) -> &str {
        &self.community
    }

    pub fn alerts(&self) -> &[Window] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Whether `instant` falls inside any alert of the community.
    pub fn covers(&self, instant: &DateTime<Tz>) -> bool {
        // Sorted and disjoint: only the last alert starting at or before
        // `instant` can contain it.
        let idx = self.alerts.partition_point(|alert| alert.start <= *instant);
        idx > 0 && self.alerts[idx - 1].contains(instant)
    }
}
