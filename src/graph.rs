//! ### Graph
//! Renders score reports and household series as shareable PNGs.

use anyhow::{anyhow, bail};
use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use plotters::backend::BitMapBackend;
use plotters::chart::ChartBuilder;
use plotters::drawing::IntoDrawingArea;
use plotters::element::EmptyElement;
use plotters::element::Rectangle;
use plotters::element::Text;
use plotters::prelude::IntoSegmentedCoord;
use plotters::prelude::SegmentValue;
use plotters::series::Histogram;
use plotters::series::LineSeries;
use plotters::style::full_palette::BLUE_600;
use plotters::style::Color;
use plotters::style::FontTransform;
use plotters::style::IntoFont;
use plotters::style::RGBColor;
use plotters::style::RED;
use plotters::style::BLACK;
use plotters::style::WHITE;
use std::collections::BTreeMap;
use std::path::Path;

use crate::baseline::Aggregate;
use crate::report::ScoreReport;
use crate::score::Cadence;
use crate::series::HouseholdSeries;

pub struct Graphing<'a> {
    path: &'a Path,
}

impl<'a> Graphing<'a> {
    const CHART_COLOR: RGBColor = WHITE;

    pub fn new(path: &'a Path) -> Self {
        Graphing { path }
    }

    /// Average consumption of each time-of-day slot over the whole series.
    /// Slots that were never recorded stay at zero.
    pub fn daily_profile(series: &HouseholdSeries, cadence: Cadence) -> Vec<f64> {
        let slots = (24 * cadence.samples_per_hour()) as usize;
        let mut totals = vec![0.; slots];
        let mut counts = vec![0usize; slots];
        for point in series.points() {
            let time = point.timestamp.time();
            let idx = ((time.hour() * 60 + time.minute()) / cadence.minutes()) as usize;
            totals[idx] += point.consumption;
            counts[idx] += 1;
        }
        for (total, ct) in totals.iter_mut().zip(&counts) {
            if *ct > 0 {
                *total /= *ct as f64;
            }
        }
        totals
    }

    /// Mean consumption across households at every instant of `[from, to)`,
    /// averaged over the households that have a reading at that instant.
    pub fn community_average(
        series: &[HouseholdSeries],
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Vec<(DateTime<Tz>, f64)> {
        let mut instants: BTreeMap<DateTime<Tz>, Aggregate> = BTreeMap::new();
        for household in series {
            for point in household.points() {
                if from <= point.timestamp && point.timestamp < to {
                    instants
                        .entry(point.timestamp)
                        .or_default()
                        .push(point.consumption);
                }
            }
        }
        instants
            .into_iter()
            .filter_map(|(instant, agg)| agg.mean().map(|mean| (instant, mean)))
            .collect()
    }

    /// Diverging scale: reductions fade to green, increases to red, both
    /// from white at zero and saturating at `extent`.
    pub fn cell_color(value: f64, extent: f64) -> RGBColor {
        let t = if extent > 0. {
            (value.abs() / extent).clamp(0., 1.)
        } else {
            0.
        };
        let fade = |c: u8| (255. - (255. - f64::from(c)) * t).round() as u8;
        if value < 0. {
            RGBColor(fade(0x2e), fade(0x7d), fade(0x32))
        } else {
            RGBColor(fade(0xc6), fade(0x28), fade(0x28))
        }
    }

    pub fn household_profile(
        &self,
        series: &HouseholdSeries,
        cadence: Cadence,
    ) -> anyhow::Result<()> {
        if series.is_empty() {
            bail!("household {} has no readings to plot", series.household_id());
        }
        let profile = Self::daily_profile(series, cadence);

        let root = BitMapBackend::new(self.path, (1080, 720)).into_drawing_area();
        root.fill(&Self::CHART_COLOR)?;

        let max_watts = profile.iter().fold(0f64, |acc, el| el.max(acc));
        let mut chart = ChartBuilder::on(&root)
            .x_label_area_size(72)
            .y_label_area_size(84)
            .margin(20)
            .caption(
                format!("Daily consumption profile, {}", series.household_id()),
                ("sans-serif", 40.),
            )
            .build_cartesian_2d(0..profile.len(), 0f64..(max_watts * 1.1))?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .bold_line_style(WHITE.mix(0.3))
            .y_desc("W")
            .x_desc("Time of day")
            .axis_desc_style(("sans-serif", 30))
            .x_label_formatter(&|&idx| {
                let mins = idx as u32 * cadence.minutes();
                format!("{:02}:{:02}", mins / 60, mins % 60)
            })
            .x_labels(24)
            .y_labels(10)
            .x_label_style(("sans-serif", 16))
            .y_label_style(("sans-serif", 16))
            .draw()?;

        chart.draw_series(LineSeries::new(
            profile.iter().copied().enumerate(),
            BLUE_600.stroke_width(3),
        ))?;

        root.present()?;

        Ok(())
    }

    /// Histogram of the Bilan row, one bar per (alert, horizon) column.
    pub fn bilan(&self, labels: &[String], report: &ScoreReport) -> anyhow::Result<()> {
        let sums = &report.sums;
        if sums.is_empty() {
            bail!("report has no columns");
        }

        let root = BitMapBackend::new(self.path, (1600, 900)).into_drawing_area();
        root.fill(&Self::CHART_COLOR)?;

        let lowest = sums
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or_else(|| anyhow!("Failed to compute chart min"))?;
        let highest = sums
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or_else(|| anyhow!("Failed to compute chart max"))?;
        let pad = (highest - lowest).abs().max(0.1) * 0.1;

        let mut chart = ChartBuilder::on(&root)
            .x_label_area_size(220)
            .y_label_area_size(84)
            .margin(20)
            .caption("Community energy delta per window", ("sans-serif", 40.))
            .build_cartesian_2d(
                (0..(sums.len() - 1)).into_segmented(),
                (lowest.min(0.) - pad)..(highest.max(0.) + pad),
            )?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc("kWh")
            .x_desc("Alert window")
            .axis_desc_style(("sans-serif", 30))
            .x_label_formatter(&|seg| match seg {
                SegmentValue::Last | SegmentValue::Exact(_) => "".to_string(),
                SegmentValue::CenterOf(idx) => labels.get(*idx).cloned().unwrap_or_default(),
            })
            .y_label_formatter(&|kwh| format!("{kwh:.2}"))
            .x_labels(sums.len())
            .y_labels(20)
            .x_label_style(
                ("sans-serif", 12)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .y_label_style(("sans-serif", 16))
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(RED.mix(0.5).filled())
                .data(sums.iter().enumerate().map(|(idx, &val)| (idx, val))),
        )?;

        root.present()?;

        Ok(())
    }

    /// Heatmap of the score matrix, households down, windows across, each
    /// cell annotated with its percentage.
    pub fn matrix(&self, labels: &[String], report: &ScoreReport) -> anyhow::Result<()> {
        let rows = report.matrix.len() as i32;
        let cols = labels.len() as i32;
        if rows == 0 || cols == 0 {
            bail!("report has no cells");
        }
        let extent = report
            .matrix
            .iter()
            .flatten()
            .fold(0f64, |acc, el| acc.max(el.abs()));

        let width = 400 + 60 * cols as u32;
        let height = 300 + 40 * rows as u32;
        let root = BitMapBackend::new(self.path, (width, height)).into_drawing_area();
        root.fill(&Self::CHART_COLOR)?;

        let mut chart = ChartBuilder::on(&root)
            .x_label_area_size(220)
            .y_label_area_size(120)
            .margin(20)
            .caption("Reaction per household and window (%)", ("sans-serif", 40.))
            .build_cartesian_2d(0..cols, 0..rows)?;

        // Row 0 is drawn at the top.
        let household_at = |y: i32| {
            usize::try_from(rows - 1 - y)
                .ok()
                .and_then(|row| report.households.get(row).cloned())
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(cols as usize + 1)
            .y_labels(rows as usize + 1)
            .x_label_offset(30)
            .y_label_offset(-20)
            .x_label_formatter(&|&col| {
                usize::try_from(col)
                    .ok()
                    .and_then(|col| labels.get(col).cloned())
                    .unwrap_or_default()
            })
            .y_label_formatter(&|&y| household_at(y))
            .x_label_style(
                ("sans-serif", 12)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .y_label_style(("sans-serif", 16))
            .draw()?;

        let cells = || {
            report.matrix.iter().zip(0..).flat_map(move |(row, r)| {
                row.iter()
                    .zip(0..)
                    .map(move |(&value, c)| (c, rows - 1 - r, value))
            })
        };
        chart.draw_series(cells().map(|(c, y, value)| {
            Rectangle::new(
                [(c, y), (c + 1, y + 1)],
                Self::cell_color(value, extent).filled(),
            )
        }))?;
        chart.draw_series(cells().map(|(c, y, value)| {
            EmptyElement::at((c, y))
                + Text::new(
                    format!("{value:.1}"),
                    (6, -24),
                    ("sans-serif", 14).into_font().color(&BLACK),
                )
        }))?;

        root.present()?;

        Ok(())
    }

    /// Line chart of [`Graphing::community_average`] over a period.
    pub fn community_curve(
        &self,
        community: &str,
        curve: &[(DateTime<Tz>, f64)],
    ) -> anyhow::Result<()> {
        if curve.is_empty() {
            bail!("{community} has no readings in the requested period");
        }

        let root = BitMapBackend::new(self.path, (1600, 720)).into_drawing_area();
        root.fill(&Self::CHART_COLOR)?;

        let max_watts = curve.iter().fold(0f64, |acc, (_, el)| el.max(acc));
        let mut chart = ChartBuilder::on(&root)
            .x_label_area_size(120)
            .y_label_area_size(84)
            .margin(20)
            .caption(
                format!("Average household consumption, {community}"),
                ("sans-serif", 40.),
            )
            .build_cartesian_2d(0..curve.len(), 0f64..(max_watts * 1.1))?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc("W")
            .axis_desc_style(("sans-serif", 30))
            .x_label_formatter(&|&idx| {
                curve
                    .get(idx)
                    .map(|(instant, _)| instant.format("%d/%m %H:%M").to_string())
                    .unwrap_or_default()
            })
            .x_labels(24)
            .y_labels(10)
            .x_label_style(
                ("sans-serif", 12)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .y_label_style(("sans-serif", 16))
            .draw()?;

        chart.draw_series(LineSeries::new(
            curve.iter().map(|(_, watts)| *watts).enumerate(),
            BLUE_600.stroke_width(2),
        ))?;

        root.present()?;

        Ok(())
    }
}
