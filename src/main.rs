use alert_analysis::{
    alerts::AlertCatalog, config::AnalysisConfig, convert, graph::Graphing, pipeline, quality,
    report::ReactionRanking, resample::Resampler, score::Cadence, series::CsvSeriesStore,
    series::SeriesStore,
};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser, Debug)]
enum Args {
    /// Averages raw flukso exports into fixed-width buckets and writes a
    /// chunk file the score command can read.
    /*
    cargo run resample \
        --raw-csv data/raw/h01_2023_03a.csv data/raw/h01_2023_03b.csv \
        --output-csv data/h01/2023-03.csv
    */
    Resample {
        /// Raw exports to merge. Timestamps are UTC.
        #[clap(short, long, num_args = 1.., value_delimiter = ' ')]
        raw_csv: Vec<PathBuf>,

        /// Where the resampled chunk is written
        #[clap(short, long)]
        output_csv: PathBuf,

        /// Bucket width, must divide an hour
        #[clap(short, long, default_value_t = 15)]
        minutes: u32,
    },

    /// Scores every household of every configured community against its
    /// alerts and writes one `<community>_scores.csv` per community.
    // cargo run score --config analysis.toml --out-dir results
    Score {
        /// TOML run configuration
        #[clap(short, long)]
        config: PathBuf,

        /// Directory receiving the score reports
        #[clap(short, long)]
        out_dir: PathBuf,

        /// Only run this community
        #[clap(long)]
        community: Option<String>,
    },

    /// Draws the Bilan row of a score report, one bar per window.
    // cargo run graph-bilan results/ECHO_scores.csv results/ECHO_bilan.png
    GraphBilan {
        /// A csv written by the score command
        report_csv: PathBuf,

        /// Where the output PNG file will be written.
        output_png: PathBuf,
    },

    /// Draws the score matrix as a heatmap, one row per household.
    // cargo run graph-matrix results/ECHO_scores.csv results/ECHO_matrix.png
    GraphMatrix {
        /// A csv written by the score command
        report_csv: PathBuf,

        /// Where the output PNG file will be written.
        output_png: PathBuf,
    },

    /// Draws the average household consumption of a community over a period.
    /*
    cargo run graph-community --config analysis.toml --community ECHO \
        --from "2023-03-13 00:00:00" --to "2023-03-20 00:00:00" results/ECHO_week.png
    */
    GraphCommunity {
        #[clap(short, long)]
        config: PathBuf,

        #[clap(long)]
        community: String,

        /// Local time, inclusive
        #[clap(long)]
        from: String,

        /// Local time, exclusive
        #[clap(long)]
        to: String,

        output_png: PathBuf,
    },

    /// Lists missing, negative and glitched readings of every community.
    // cargo run check-quality --config analysis.toml --out-dir results
    CheckQuality {
        #[clap(short, long)]
        config: PathBuf,

        /// Directory receiving one `<community>_quality.csv` per community
        #[clap(short, long)]
        out_dir: PathBuf,
    },

    /// Draws a household's average consumption per time of day.
    // cargo run graph-profile --config analysis.toml h01 results/h01_profile.png
    GraphProfile {
        #[clap(short, long)]
        config: PathBuf,

        household_id: String,

        output_png: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("alert_analysis=info")),
        )
        .init();

    match Args::parse() {
        Args::Resample {
            raw_csv,
            output_csv,
            minutes,
        } => {
            Resampler::new(Cadence::from_minutes(minutes)?).resample(&raw_csv, &output_csv)?;
        }
        Args::Score {
            config,
            out_dir,
            community,
        } => {
            let config = AnalysisConfig::load(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            let store = CsvSeriesStore::from_manifest(&config.manifest, config.tz()?)?;
            std::fs::create_dir_all(&out_dir)?;

            let names: Vec<String> = match community {
                Some(name) => vec![name],
                None => config.communities.iter().map(|c| c.name.clone()).collect(),
            };
            let mut failed = Vec::new();
            for name in &names {
                // A bad community must not take the others down with it.
                match pipeline::run_community(&config, &store, name, &out_dir) {
                    Ok(run) => {
                        info!(community = %name, path = %run.report_path.display(), "done");
                        print_ranking(name, &run.catalog, &run.ranking);
                    }
                    Err(e) => {
                        error!(community = %name, error = %e, "community aborted");
                        failed.push(name.as_str());
                    }
                }
            }
            if !failed.is_empty() {
                bail!("communities aborted: {}", failed.join(", "));
            }
        }
        Args::GraphBilan {
            report_csv,
            output_png,
        } => {
            let (labels, report) = convert::read_score_report(&report_csv)?;
            Graphing::new(&output_png).bilan(&labels, &report)?;
        }
        Args::GraphMatrix {
            report_csv,
            output_png,
        } => {
            let (labels, report) = convert::read_score_report(&report_csv)?;
            Graphing::new(&output_png).matrix(&labels, &report)?;
        }
        Args::GraphCommunity {
            config,
            community,
            from,
            to,
            output_png,
        } => {
            let config = AnalysisConfig::load(&config)?;
            let tz = config.tz()?;
            let store = CsvSeriesStore::from_manifest(&config.manifest, tz)?;
            let from = convert::parse_local(&from, &tz)?;
            let to = convert::parse_local(&to, &tz)?;
            if to <= from {
                bail!("--to must be after --from");
            }

            let mut series = Vec::new();
            for household_id in store.households(&community) {
                match store.load(&household_id) {
                    Ok(household) => series.push(household),
                    Err(e) => warn!(household = %household_id, error = %e, "not plotted"),
                }
            }
            let curve = Graphing::community_average(&series, from, to);
            Graphing::new(&output_png).community_curve(&community, &curve)?;
        }
        Args::CheckQuality { config, out_dir } => {
            let config = AnalysisConfig::load(&config)?;
            let store = CsvSeriesStore::from_manifest(&config.manifest, config.tz()?)?;
            std::fs::create_dir_all(&out_dir)?;
            for community in &config.communities {
                let findings = quality::check_community(&store, &community.name)?;
                let path = out_dir.join(format!("{}_quality.csv", community.name));
                quality::write_report(&path, &findings)?;
                info!(
                    community = %community.name,
                    anomalies = findings.len(),
                    path = %path.display(),
                    "quality report written"
                );
            }
        }
        Args::GraphProfile {
            config,
            household_id,
            output_png,
        } => {
            let config = AnalysisConfig::load(&config)?;
            let store = CsvSeriesStore::from_manifest(&config.manifest, config.tz()?)?;
            let series = store.load(&household_id)?;
            Graphing::new(&output_png).household_profile(&series, config.cadence()?)?;
        }
    }
    Ok(())
}

fn print_ranking(community: &str, catalog: &AlertCatalog, ranking: &ReactionRanking) {
    println!("---------- {community} alerts ranking ----------");
    for alert in ranking.alerts_by_reactions() {
        let window = &catalog.alerts()[alert];
        println!(
            "Alert {alert} ({} to {}) obtained {} reactions.",
            window.start.format("%Y-%m-%d %H:%M"),
            window.end.format("%H:%M"),
            ranking.per_alert[alert]
        );
    }
    println!("---------- {community} household reactions ----------");
    for household in &ranking.households {
        println!(
            "Household {} reacted to alerts {:?}, {:.1}% of the alerts.",
            household.household,
            household.alerts,
            ranking.share(household)
        );
    }
}
